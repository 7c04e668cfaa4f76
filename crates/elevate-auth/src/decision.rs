//! Authorization results.

use elevate_types::{GroupName, LoggingLevel, UserName};
use std::fmt;
use std::path::PathBuf;

/// Why a command was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// `cd`, `dir` or `type`: never elevated.
    ShellBuiltin,
    /// The command could not be resolved to a file.
    InvalidPath,
    /// Neither listed nor a member of any listed group.
    UserNotInPolicy,
    /// The user node is explicitly disabled.
    UserDisabled,
    /// No command rule admits the path, arguments and checksum.
    NoMatchingCommand,
    /// The matching command rule is explicitly disabled.
    CommandDisabled,
    OutsideTimeWindow,
    NetworkNotAllowed,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShellBuiltin => "shell built-in",
            Self::InvalidPath => "invalid command path",
            Self::UserNotInPolicy => "user not in policy",
            Self::UserDisabled => "user disabled",
            Self::NoMatchingCommand => "no matching command",
            Self::CommandDisabled => "command disabled",
            Self::OutsideTimeWindow => "outside time window",
            Self::NetworkNotAllowed => "network not allowed",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied(DenyReason),
}

impl Verdict {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    #[must_use]
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allowed => None,
            Self::Denied(reason) => Some(*reason),
        }
    }
}

/// Full result of checking one command for one user.
#[derive(Debug, Clone)]
pub struct CommandDecision {
    pub user: UserName,
    /// Resolved path of the command.
    pub command_path: PathBuf,
    pub verdict: Verdict,
    /// Verbosity the outcome should be audited at; `None` when the
    /// request was rejected before the policy was consulted.
    pub logging_level: Option<LoggingLevel>,
    /// User group the user matched through, if not listed by name.
    pub matched_group: Option<GroupName>,
}

impl CommandDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.verdict.is_allowed()
    }
}

/// Logon and elevation settings resolved for a user.
///
/// Limits and timeouts are `None` when no level of the chain sets
/// them; a `None` or negative limit disables the rule it drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub user: UserName,
    pub matched_group: Option<GroupName>,
    pub invalid_logons: Option<i32>,
    pub times_exceeded_invalid_logons: Option<i32>,
    pub invalid_logon_timeout: Option<u64>,
    pub lockout_timeout: Option<u64>,
    pub logon_timeout: Option<u64>,
    pub privileges_group: Option<GroupName>,
    pub logging_level: LoggingLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_helpers() {
        assert!(Verdict::Allowed.is_allowed());
        assert_eq!(Verdict::Allowed.deny_reason(), None);
        let v = Verdict::Denied(DenyReason::CommandDisabled);
        assert!(!v.is_allowed());
        assert_eq!(v.deny_reason(), Some(DenyReason::CommandDisabled));
        assert_eq!(DenyReason::CommandDisabled.to_string(), "command disabled");
    }
}
