//! Primary policy sources.
//!
//! A source only fetches raw bytes and reports their format; parsing and
//! validation belong to the store so every source is held to the same
//! schema.

use crate::error::PolicyError;
use crate::schema::PolicyFormat;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Raw policy body as fetched.
#[derive(Debug, Clone)]
pub struct RawPolicy {
    pub body: String,
    pub format: PolicyFormat,
}

/// Where the authoritative policy lives.
pub trait PolicySource: Send + Sync {
    /// Human-readable location, used in logs and errors.
    fn describe(&self) -> String;

    /// Fetches the current body.
    ///
    /// # Errors
    ///
    /// [`PolicyError::Fetch`] or [`PolicyError::ReadFile`] when the
    /// source is unreachable.
    fn fetch(&self) -> Result<RawPolicy, PolicyError>;
}

/// Policy stored in a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PolicySource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<RawPolicy, PolicyError> {
        let body = std::fs::read_to_string(&self.path)
            .map_err(|e| PolicyError::read_file(&self.path, e))?;
        Ok(RawPolicy {
            body,
            format: PolicyFormat::from_path(&self.path),
        })
    }
}

/// Policy served over HTTP(S).
pub struct HttpSource {
    uri: String,
    agent: ureq::Agent,
}

impl HttpSource {
    pub fn new(uri: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            uri: uri.into(),
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource").field("uri", &self.uri).finish()
    }
}

impl PolicySource for HttpSource {
    fn describe(&self) -> String {
        self.uri.clone()
    }

    fn fetch(&self) -> Result<RawPolicy, PolicyError> {
        let mut resp = self.agent.get(&self.uri).call().map_err(|e| match e {
            ureq::Error::StatusCode(status) => PolicyError::fetch(&self.uri, format!("HTTP {status}")),
            other => PolicyError::fetch(&self.uri, other.to_string()),
        })?;
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| PolicyError::fetch(&self.uri, e.to_string()))?;
        Ok(RawPolicy {
            body,
            format: PolicyFormat::from_content_type(content_type.as_deref(), &self.uri),
        })
    }
}

/// Builds a source for `uri`: a plain path, `file://` or `http(s)://`.
///
/// # Errors
///
/// [`PolicyError::UnsupportedSource`] for any other scheme.
pub fn open(uri: &str, timeout: Duration) -> Result<Box<dyn PolicySource>, PolicyError> {
    let lower = uri.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(Box::new(HttpSource::new(uri, timeout)));
    }
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(Box::new(FileSource::new(path)));
    }
    match uri.split_once("://") {
        Some(_) => Err(PolicyError::UnsupportedSource(uri.to_string())),
        None => Ok(Box::new(FileSource::new(uri))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_source_reads_body_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "schema = 'x'").unwrap();

        let src = FileSource::new(&path);
        let raw = src.fetch().unwrap();
        assert_eq!(raw.format, PolicyFormat::Toml);
        assert!(raw.body.contains("schema"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let src = FileSource::new("/nonexistent/elevate/policy.json");
        let err = src.fetch().unwrap_err();
        assert!(matches!(err, PolicyError::ReadFile { .. }));
        assert!(!err.is_invalid_document());
    }

    #[test]
    fn open_dispatches_on_scheme() {
        let t = Duration::from_secs(1);
        assert!(open("https://policy.corp/sudoers.json", t).unwrap().describe().starts_with("https://"));
        assert_eq!(open("file:///etc/elevate/p.json", t).unwrap().describe(), "/etc/elevate/p.json");
        assert_eq!(open("p.json", t).unwrap().describe(), "p.json");
        assert!(matches!(
            open("ftp://x/p.json", t),
            Err(PolicyError::UnsupportedSource(_))
        ));
    }
}
