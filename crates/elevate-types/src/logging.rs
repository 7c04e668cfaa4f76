//! Audit verbosity.

use crate::result::AuditClass;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which outcomes are written to the audit sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    None,
    Success,
    Failure,
    #[default]
    Both,
}

impl LoggingLevel {
    /// Returns `true` if an outcome of `class` should be recorded.
    ///
    /// ```
    /// use elevate_types::{AuditClass, LoggingLevel};
    ///
    /// assert!(LoggingLevel::Both.admits(AuditClass::Failure));
    /// assert!(!LoggingLevel::Success.admits(AuditClass::Failure));
    /// assert!(!LoggingLevel::None.admits(AuditClass::Success));
    /// ```
    #[must_use]
    pub fn admits(self, class: AuditClass) -> bool {
        match (self, class) {
            (Self::Both, _) => true,
            (Self::Success, AuditClass::Success) => true,
            (Self::Failure, AuditClass::Failure) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoggingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Both => "both",
        })
    }
}

impl FromStr for LoggingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown logging level: {other}")),
        }
    }
}
