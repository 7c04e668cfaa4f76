//! Error types for authorization and the OS collaborators.
//!
//! [`SudoError`] is what an elevation request fails with. Every variant
//! maps onto the stable [`ResultCode`] taxonomy returned to callers; the
//! collaborator errors ([`DirectoryError`], [`LaunchError`],
//! [`AuthError`]) and [`PolicyError`] all collapse to
//! [`ResultCode::GenericError`], which always denies.

use crate::decision::DenyReason;
use elevate_policy::PolicyError;
use elevate_types::{ErrorCode, ResultCode};
use std::path::PathBuf;
use thiserror::Error;

/// Directory service (OS group membership) failure.
///
/// Not-found is not an error: lookups return `Ok(None)`.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// The directory could not be reached.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// A membership query or mutation failed.
    #[error("{operation} failed for '{member}' in '{group}': {message}")]
    Operation {
        operation: &'static str,
        group: String,
        member: String,
        message: String,
    },
}

impl DirectoryError {
    pub fn operation(
        operation: &'static str,
        group: impl Into<String>,
        member: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            operation,
            group: group.into(),
            member: member.into(),
            message: message.into(),
        }
    }
}

impl ErrorCode for DirectoryError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "DIRECTORY_UNAVAILABLE",
            Self::Operation { .. } => "DIRECTORY_OPERATION",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Process launch failure.
#[derive(Debug, Clone, Error)]
pub enum LaunchError {
    #[error("failed to start {}: {message}", command.display())]
    Spawn { command: PathBuf, message: String },

    #[error("failed waiting for process {pid}: {message}")]
    Wait { pid: u32, message: String },
}

impl LaunchError {
    pub fn spawn(command: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Spawn {
            command: command.into(),
            message: message.into(),
        }
    }

    pub fn wait(pid: u32, message: impl Into<String>) -> Self {
        Self::Wait {
            pid,
            message: message.into(),
        }
    }
}

impl ErrorCode for LaunchError {
    fn code(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "LAUNCH_SPAWN",
            Self::Wait { .. } => "LAUNCH_WAIT",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Authentication provider failure (distinct from a wrong secret).
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("authentication provider unavailable: {0}")]
    Unavailable(String),
}

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "AUTH_UNAVAILABLE",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}

/// Why an elevation request failed.
#[derive(Debug, Error)]
pub enum SudoError {
    /// A local account named by the request does not exist.
    #[error("Username {domain}\\{user} not found")]
    UsernameNotFound { domain: String, user: String },

    /// A group named by the policy does not exist on this machine or
    /// in the directory.
    #[error("Group {group} not found")]
    GroupNotFound { group: String },

    /// The policy denied the request.
    #[error("Command not allowed: {reason}")]
    CommandNotAllowed { reason: DenyReason },

    #[error("Invalid logon attempt")]
    InvalidLogon,

    #[error("Invalid logon limit exceeded")]
    TooManyInvalidLogons,

    #[error("Locked out")]
    LockedOut,

    /// No usable policy. Always denies.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The service broke one of its own invariants.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SudoError {
    pub fn denied(reason: DenyReason) -> Self {
        Self::CommandNotAllowed { reason }
    }

    pub fn group_not_found(group: impl std::fmt::Display) -> Self {
        Self::GroupNotFound {
            group: group.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn username_not_found(domain: impl Into<String>, user: impl Into<String>) -> Self {
        Self::UsernameNotFound {
            domain: domain.into(),
            user: user.into(),
        }
    }

    /// Code returned to the caller.
    #[must_use]
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::UsernameNotFound { .. } => ResultCode::UsernameNotFound,
            Self::GroupNotFound { .. } => ResultCode::GroupNotFound,
            Self::CommandNotAllowed { .. } => ResultCode::CommandNotAllowed,
            Self::InvalidLogon => ResultCode::InvalidLogon,
            Self::TooManyInvalidLogons => ResultCode::TooManyInvalidLogons,
            Self::LockedOut => ResultCode::LockedOut,
            Self::Policy(_)
            | Self::Directory(_)
            | Self::Launch(_)
            | Self::Auth(_)
            | Self::Internal(_) => ResultCode::GenericError,
        }
    }

    /// Message shown to the caller.
    ///
    /// Names the offending account or group where the caller supplied
    /// or can act on it; internal failures are reported generically.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::UsernameNotFound { .. } | Self::GroupNotFound { .. } => self.to_string(),
            Self::CommandNotAllowed { .. } => "Command not allowed".to_string(),
            Self::InvalidLogon | Self::TooManyInvalidLogons | Self::LockedOut => self.to_string(),
            Self::Policy(_) => "Authorization policy unavailable".to_string(),
            Self::Directory(_) | Self::Auth(_) | Self::Internal(_) => "Internal error".to_string(),
            Self::Launch(_) => "Command could not be started".to_string(),
        }
    }
}

impl ErrorCode for SudoError {
    fn code(&self) -> &'static str {
        match self {
            Self::UsernameNotFound { .. } => "SUDO_USERNAME_NOT_FOUND",
            Self::GroupNotFound { .. } => "SUDO_GROUP_NOT_FOUND",
            Self::CommandNotAllowed { .. } => "SUDO_COMMAND_NOT_ALLOWED",
            Self::InvalidLogon => "SUDO_INVALID_LOGON",
            Self::TooManyInvalidLogons => "SUDO_TOO_MANY_INVALID_LOGONS",
            Self::LockedOut => "SUDO_LOCKED_OUT",
            Self::Policy(_) => "SUDO_POLICY",
            Self::Directory(_) => "SUDO_DIRECTORY",
            Self::Launch(_) => "SUDO_LAUNCH",
            Self::Auth(_) => "SUDO_AUTH",
            Self::Internal(_) => "SUDO_INTERNAL",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidLogon => true,
            Self::Policy(e) => e.is_recoverable(),
            Self::Directory(e) => e.is_recoverable(),
            Self::Auth(e) => e.is_recoverable(),
            _ => false,
        }
    }
}
