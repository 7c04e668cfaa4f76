//! Policy errors.

use elevate_types::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading, validating or caching a policy document.
///
/// [`Parse`](Self::Parse) and [`Schema`](Self::Schema) are treated
/// identically by the store: a document that is well-formed but
/// violates the schema is as unusable as one that does not parse.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Failed to read a policy or cache file.
    #[error("failed to read policy file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the cache file.
    #[error("failed to write policy cache '{path}': {source}")]
    WriteCache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The primary source could not be reached.
    #[error("policy source '{uri}' is unreachable: {message}")]
    Fetch { uri: String, message: String },

    /// The document is not well-formed.
    #[error("failed to parse policy from '{origin}': {message}")]
    Parse { origin: String, message: String },

    /// The document parsed but violates the schema.
    #[error("policy from '{origin}' violates schema: {message}")]
    Schema { origin: String, message: String },

    /// A CSV feed row is malformed.
    #[error("invalid policy feed line {line}: {message}")]
    Feed { line: usize, message: String },

    /// Neither the primary source nor a usable cache is available.
    #[error("no usable policy: {0}")]
    Unavailable(String),

    /// The primary source URI uses an unsupported scheme.
    #[error("unsupported policy source '{0}'")]
    UnsupportedSource(String),
}

impl PolicyError {
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    pub fn write_cache(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteCache {
            path: path.into(),
            source,
        }
    }

    pub fn fetch(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fetch {
            uri: uri.into(),
            message: message.into(),
        }
    }

    pub fn parse(origin: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: message.to_string(),
        }
    }

    pub fn schema(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn feed(line: usize, message: impl Into<String>) -> Self {
        Self::Feed {
            line,
            message: message.into(),
        }
    }

    /// Returns `true` if the document itself is bad (as opposed to the
    /// source being unreachable).
    #[must_use]
    pub fn is_invalid_document(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::Schema { .. } | Self::Feed { .. }
        )
    }
}

impl ErrorCode for PolicyError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } => "POLICY_READ_FILE",
            Self::WriteCache { .. } => "POLICY_WRITE_CACHE",
            Self::Fetch { .. } => "POLICY_FETCH",
            Self::Parse { .. } => "POLICY_PARSE",
            Self::Schema { .. } => "POLICY_SCHEMA",
            Self::Feed { .. } => "POLICY_FEED",
            Self::Unavailable(_) => "POLICY_UNAVAILABLE",
            Self::UnsupportedSource(_) => "POLICY_UNSUPPORTED_SOURCE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ReadFile { .. } | Self::WriteCache { .. } | Self::Fetch { .. } | Self::Unavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elevate_types::assert_error_codes;

    #[test]
    fn all_codes_follow_convention() {
        let io = || std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_error_codes(
            &[
                PolicyError::read_file("/a", io()),
                PolicyError::write_cache("/b", io()),
                PolicyError::fetch("http://x", "refused"),
                PolicyError::parse("a.json", "eof"),
                PolicyError::schema("a.json", "bad ref"),
                PolicyError::feed(3, "missing column"),
                PolicyError::Unavailable("stale".into()),
                PolicyError::UnsupportedSource("ftp://x".into()),
            ],
            "POLICY_",
        );
    }

    #[test]
    fn document_errors_are_not_recoverable() {
        let err = PolicyError::schema("p.json", "unknown command group 'x'");
        assert!(err.is_invalid_document());
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("unknown command group"));

        let err = PolicyError::fetch("https://policy", "timeout");
        assert!(!err.is_invalid_document());
        assert!(err.is_recoverable());
    }
}
