//! Service construction errors.

use crate::audit::AuditError;
use crate::config::ConfigError;
use elevate_policy::PolicyError;
use elevate_types::ErrorCode;
use thiserror::Error;

/// Failure to assemble a [`SudoService`](crate::SudoService).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl ErrorCode for ServiceError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.code(),
            Self::Policy(e) => e.code(),
            Self::Audit(e) => e.code(),
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_recoverable(),
            Self::Policy(e) => e.is_recoverable(),
            Self::Audit(e) => e.is_recoverable(),
        }
    }
}
