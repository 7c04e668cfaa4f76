//! Audit trail of sudo invocations.
//!
//! [`AuditLogger::log_result`] classifies a result code as success or
//! failure, drops it if the resolved logging level does not admit that
//! class, and hands one [`AuditRecord`] to every sink. Sink failures are
//! logged and swallowed: auditing never changes the outcome returned to
//! the caller.

use crate::config::AuditConfig;
use chrono::{DateTime, Utc};
use elevate_types::{AuditClass, ErrorCode, InvocationId, LoggingLevel, ResultCode, UserName};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Tracing target of audit events.
pub const AUDIT_TARGET: &str = "elevate::audit";

/// Audit sink failure.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to write audit log '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode audit record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl AuditError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl ErrorCode for AuditError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "AUDIT_IO",
            Self::Encode(_) => "AUDIT_ENCODE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// One audited invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub invocation: InvocationId,
    pub user: String,
    pub command: String,
    pub arguments: String,
    pub result: ResultCode,
    pub code: i32,
    pub class: AuditClass,
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Writes one record.
    ///
    /// # Errors
    ///
    /// Any I/O or encoding failure; the logger swallows it.
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Emits records as `tracing` events on [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, r: &AuditRecord) -> Result<(), AuditError> {
        match r.class {
            AuditClass::Success => tracing::info!(
                target: AUDIT_TARGET,
                invocation = %r.invocation,
                user = %r.user,
                command = %r.command,
                arguments = %r.arguments,
                result = %r.result,
                code = r.code,
                "success audit"
            ),
            AuditClass::Failure => tracing::warn!(
                target: AUDIT_TARGET,
                invocation = %r.invocation,
                user = %r.user,
                command = %r.command,
                arguments = %r.arguments,
                result = %r.result,
                code = r.code,
                "failure audit"
            ),
        }
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    /// Opens (creating if needed) `path` for appending.
    ///
    /// # Errors
    ///
    /// [`AuditError::Io`] if the file or its directory cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AuditError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        file.write_all(&line)
            .and_then(|()| file.flush())
            .map_err(|e| AuditError::io(&self.path, e))
    }
}

/// Fans audit records out to the configured sinks.
#[derive(Clone, Default)]
pub struct AuditLogger {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl AuditLogger {
    /// Logger with no sinks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Builds the sinks `config` asks for.
    ///
    /// # Errors
    ///
    /// [`AuditError::Io`] if the JSON-lines file cannot be opened.
    pub fn from_config(config: &AuditConfig) -> Result<Self, AuditError> {
        let mut logger = Self::new();
        if config.tracing {
            logger = logger.with_sink(Arc::new(TracingAuditSink));
        }
        if let Some(ref path) = config.json_lines_path {
            logger = logger.with_sink(Arc::new(JsonLinesAuditSink::open(path)?));
        }
        Ok(logger)
    }

    #[must_use]
    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Audits one invocation and passes `code` through.
    pub fn log_result(
        &self,
        invocation: InvocationId,
        user: &UserName,
        command: &Path,
        arguments: &str,
        level: LoggingLevel,
        code: ResultCode,
    ) -> ResultCode {
        let class = code.audit_class();
        if !level.admits(class) || self.sinks.is_empty() {
            return code;
        }

        let record = AuditRecord {
            timestamp: Utc::now(),
            invocation,
            user: user.to_string(),
            command: command.display().to_string(),
            arguments: arguments.to_string(),
            result: code,
            code: code.code(),
            class,
        };
        for sink in &self.sinks {
            if let Err(e) = sink.record(&record) {
                tracing::warn!(error = %e, code = e.code(), "audit sink failed");
            }
        }
        code
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use elevate_types::assert_error_code;

    /// Keeps records in memory.
    #[derive(Debug, Default)]
    pub(crate) struct MemorySink {
        pub(crate) records: Mutex<Vec<AuditRecord>>,
    }

    impl MemorySink {
        pub(crate) fn results(&self) -> Vec<ResultCode> {
            self.records.lock().iter().map(|r| r.result).collect()
        }
    }

    impl AuditSink for MemorySink {
        fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
            self.records.lock().push(record.clone());
            Ok(())
        }
    }

    struct BrokenSink;

    impl AuditSink for BrokenSink {
        fn record(&self, _: &AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::io(
                "/dev/full",
                std::io::Error::other("no space left on device"),
            ))
        }
    }

    fn alice() -> UserName {
        UserName::parse("HOST\\alice").unwrap()
    }

    fn log(logger: &AuditLogger, level: LoggingLevel, code: ResultCode) -> ResultCode {
        logger.log_result(
            InvocationId::new(),
            &alice(),
            Path::new("c:\\tools\\build.exe"),
            "--release",
            level,
            code,
        )
    }

    #[test]
    fn level_filters_by_class() {
        let sink = Arc::new(MemorySink::default());
        let logger = AuditLogger::new().with_sink(sink.clone());

        log(&logger, LoggingLevel::Failure, ResultCode::Ok);
        log(&logger, LoggingLevel::Failure, ResultCode::CommandNotAllowed);
        log(&logger, LoggingLevel::Success, ResultCode::OkAdded);
        log(&logger, LoggingLevel::Success, ResultCode::LockedOut);
        log(&logger, LoggingLevel::None, ResultCode::GenericError);
        log(&logger, LoggingLevel::Both, ResultCode::InvalidLogon);

        assert_eq!(
            sink.results(),
            vec![
                ResultCode::CommandNotAllowed,
                ResultCode::OkAdded,
                ResultCode::InvalidLogon
            ]
        );
        let first = &sink.records.lock()[0];
        assert_eq!(first.user, "HOST\\alice");
        assert_eq!(first.code, 1);
        assert_eq!(first.class, AuditClass::Failure);
    }

    #[test]
    fn sink_failure_is_swallowed() {
        let sink = Arc::new(MemorySink::default());
        let logger = AuditLogger::new()
            .with_sink(Arc::new(BrokenSink))
            .with_sink(sink.clone());
        assert_eq!(
            log(&logger, LoggingLevel::Both, ResultCode::Ok),
            ResultCode::Ok
        );
        assert_eq!(sink.results(), vec![ResultCode::Ok]);
    }

    #[test]
    fn json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");
        let sink = Arc::new(JsonLinesAuditSink::open(&path).unwrap());
        let logger = AuditLogger::new()
            .with_sink(Arc::new(TracingAuditSink))
            .with_sink(sink);

        log(&logger, LoggingLevel::Both, ResultCode::OkAdded);
        log(&logger, LoggingLevel::Both, ResultCode::CommandNotAllowed);

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = body
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"], "ok_added");
        assert_eq!(lines[0]["class"], "success");
        assert_eq!(lines[1]["code"], 1);
        assert_eq!(lines[1]["arguments"], "--release");
    }

    #[test]
    fn from_config_builds_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditConfig {
            tracing: false,
            json_lines_path: Some(dir.path().join("audit.jsonl")),
        };
        assert_eq!(AuditLogger::from_config(&config).unwrap().sink_count(), 1);
        assert_eq!(
            AuditLogger::from_config(&AuditConfig::default()).unwrap().sink_count(),
            1
        );
    }

    #[test]
    fn error_codes() {
        let err = AuditError::io("/x", std::io::Error::other("boom"));
        assert_error_code(&err, "AUDIT_");
        assert!(err.is_recoverable());
    }
}
