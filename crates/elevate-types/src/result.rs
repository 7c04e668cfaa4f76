//! Stable result codes returned to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a sudo invocation.
///
/// The numeric values are a wire contract with clients and must not
/// change. [`ResultCode::OkAdded`] distinguishes "the user was added to
/// the privileges group for this invocation and will be removed again"
/// from [`ResultCode::Ok`] "the user already held the membership".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    GenericError,
    Ok,
    CommandNotAllowed,
    InvalidLogon,
    TooManyInvalidLogons,
    LockedOut,
    UsernameNotFound,
    GroupNotFound,
    OkAdded,
}

impl ResultCode {
    /// Numeric wire value.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::GenericError => -1,
            Self::Ok => 0,
            Self::CommandNotAllowed => 1,
            Self::InvalidLogon => 2,
            Self::TooManyInvalidLogons => 3,
            Self::LockedOut => 4,
            Self::UsernameNotFound => 5,
            Self::GroupNotFound => 6,
            Self::OkAdded => 7,
        }
    }

    /// Inverse of [`code`](Self::code).
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => Self::GenericError,
            0 => Self::Ok,
            1 => Self::CommandNotAllowed,
            2 => Self::InvalidLogon,
            3 => Self::TooManyInvalidLogons,
            4 => Self::LockedOut,
            5 => Self::UsernameNotFound,
            6 => Self::GroupNotFound,
            7 => Self::OkAdded,
            _ => return None,
        })
    }

    /// Returns `true` for [`Ok`](Self::Ok) and [`OkAdded`](Self::OkAdded).
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::OkAdded)
    }

    /// Audit classification of this outcome.
    #[must_use]
    pub fn audit_class(self) -> AuditClass {
        if self.is_success() {
            AuditClass::Success
        } else {
            AuditClass::Failure
        }
    }

    /// Process exit status for command-line front ends.
    ///
    /// Successes map to 0, every failure to its positive wire value,
    /// and [`GenericError`](Self::GenericError) to 255.
    #[must_use]
    pub fn exit_status(self) -> u8 {
        match self {
            Self::Ok | Self::OkAdded => 0,
            Self::GenericError => 255,
            other => other.code() as u8,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::GenericError => "generic_error",
            Self::Ok => "ok",
            Self::CommandNotAllowed => "command_not_allowed",
            Self::InvalidLogon => "invalid_logon",
            Self::TooManyInvalidLogons => "too_many_invalid_logons",
            Self::LockedOut => "locked_out",
            Self::UsernameNotFound => "username_not_found",
            Self::GroupNotFound => "group_not_found",
            Self::OkAdded => "ok_added",
        };
        f.write_str(s)
    }
}

/// Success/failure classification used to filter audit output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditClass {
    Success,
    Failure,
}
