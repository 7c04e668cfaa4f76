//! Authorization engine.
//!
//! Decides whether a user may run a command elevated:
//!
//! ```text
//! verify_command(user, command, args)
//!   │
//!   ├─ shell built-in? ─────────────────────────────► Denied(ShellBuiltin)
//!   ├─ resolve path (as given / PATH, .exe .bat .cmd .lnk)
//!   │                                      miss ────► Denied(InvalidPath)
//!   ├─ find_user: listed entry, else first user group
//!   │  whose OS group has the user as member ───────► Denied(UserNotInPolicy)
//!   ├─ allowAllCommands ────────────────────────────► Allowed
//!   ├─ user enabled (node + containing group) ──────► Denied(UserDisabled)
//!   ├─ find_command (user, user refs, parent, parent refs)
//!   │                                      miss ────► Denied(NoMatchingCommand)
//!   ├─ command enabled (command + command group) ───► Denied(CommandDisabled)
//!   ├─ [startTime, endTime) ────────────────────────► Denied(OutsideTimeWindow)
//!   └─ allowedNetworks vs hostname / addresses ─────► Denied(NetworkNotAllowed)
//! ```
//!
//! Lookup failures (`GroupNotFound`, `UsernameNotFound`) and policy load
//! failures are errors, not denials, and also fail closed.

use crate::decision::{CommandDecision, DenyReason, UserInfo, Verdict};
use crate::error::SudoError;
use crate::files::{is_shell_builtin, CommandFiles};
use crate::membership::Membership;
use crate::provider::{DirectoryProvider, HostInfo};
use chrono::NaiveTime;
use elevate_policy::attributes::{
    AllowAllCommands, Enabled, InvalidLogonTimeout, InvalidLogons, LockoutTimeout, Logging,
    LogonTimeout, Networks, PrivilegesGroup, TimesExceededInvalidLogons,
};
use elevate_policy::{
    CommandEntry, CommandNode, CommandOrigin, PolicyDocument, PolicyStore, UserNode,
};
use elevate_types::{LoggingLevel, UserName};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Authorization backend.
///
/// [`AuthorizationEngine`] is the document-backed implementation.
pub trait AuthorizationProvider: Send + Sync {
    /// Logon and elevation settings for `user`, `None` if the policy
    /// does not cover them.
    fn user_info(&self, user: &UserName) -> Result<Option<UserInfo>, SudoError>;

    /// Checks `command` with `arguments` for `user` at the current
    /// local time.
    fn verify_command(
        &self,
        user: &UserName,
        command: &str,
        arguments: &str,
    ) -> Result<CommandDecision, SudoError>;

    /// Reloads the policy; see [`PolicyStore::update`].
    fn update(&self, force: bool) -> bool;
}

/// Policy-document authorization.
pub struct AuthorizationEngine {
    store: Arc<PolicyStore>,
    membership: Membership,
    host: Arc<dyn HostInfo>,
    files: Arc<dyn CommandFiles>,
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("membership", &self.membership)
            .finish_non_exhaustive()
    }
}

impl AuthorizationEngine {
    pub fn new(
        store: Arc<PolicyStore>,
        directory: Arc<dyn DirectoryProvider>,
        host: Arc<dyn HostInfo>,
        files: Arc<dyn CommandFiles>,
    ) -> Self {
        let membership = Membership::new(directory, host.machine_name());
        Self {
            store,
            membership,
            host,
            files,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    #[must_use]
    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Resolves `user` against `doc`.
    ///
    /// A listed entry wins. Otherwise user groups are tried in document
    /// order and the first whose OS group contains the user is returned,
    /// relabeled with the user's name. A directory group or user that
    /// cannot be found ends the search.
    ///
    /// # Errors
    ///
    /// [`SudoError::GroupNotFound`] / [`SudoError::UsernameNotFound`]
    /// for missing local accounts; directory failures.
    pub fn find_user<'d>(
        &self,
        doc: &'d PolicyDocument,
        user: &UserName,
    ) -> Result<Option<UserNode<'d>>, SudoError> {
        if let Some(node) = UserNode::listed(doc, user) {
            return Ok(Some(node));
        }
        for group in &doc.user_groups {
            match self.membership.is_member_of(user, &group.name)? {
                Some(true) => {
                    tracing::debug!(user = %user, group = %group.name, "matched through user group");
                    return Ok(Some(UserNode::via_group(doc, group, user.clone())));
                }
                Some(false) => {}
                None => break,
            }
        }
        Ok(None)
    }

    /// First command rule admitting `path`, `arguments` and `checksum`.
    ///
    /// Searched in order: the user node's commands, its command group
    /// references, then the same two for its containing group. An
    /// earlier step always shadows a later one.
    #[must_use]
    pub fn find_command<'d>(
        user: &UserNode<'d>,
        path: &str,
        arguments: Option<&str>,
        checksum: Option<&str>,
    ) -> Option<CommandNode<'d>> {
        let doc = user.document();
        let direct = |entries: &'d [CommandEntry], origin: CommandOrigin| {
            entries
                .iter()
                .find(|c| c.matches(path, arguments, checksum))
                .map(|c| CommandNode::new(c, None, origin))
        };
        let by_ref = |refs: &'d [String], origin: CommandOrigin| {
            refs.iter()
                .filter_map(|name| doc.command_group(name))
                .find_map(|group| {
                    group
                        .commands
                        .iter()
                        .find(|c| c.matches(path, arguments, checksum))
                        .map(|c| CommandNode::new(c, Some(group), origin))
                })
        };

        direct(user.commands(), CommandOrigin::User)
            .or_else(|| by_ref(user.command_group_refs(), CommandOrigin::UserGroupRef))
            .or_else(|| {
                user.parent().and_then(|parent| {
                    direct(&parent.commands, CommandOrigin::Parent).or_else(|| {
                        by_ref(&parent.command_group_refs, CommandOrigin::ParentGroupRef)
                    })
                })
            })
    }

    /// Applies the policy to an already resolved user and command file.
    ///
    /// Returns the verdict and the logging level to audit it at.
    pub fn evaluate(
        &self,
        user: &UserNode<'_>,
        path: &Path,
        arguments: &str,
        now: NaiveTime,
    ) -> (Verdict, LoggingLevel) {
        let user_logging = user.attribute::<Logging>(true).unwrap_or_default();

        if user.attribute::<AllowAllCommands>(true) == Some(true) {
            return (Verdict::Allowed, user_logging);
        }
        if user.attribute::<Enabled>(false) == Some(false) {
            return (Verdict::Denied(DenyReason::UserDisabled), user_logging);
        }

        let checksum = self.files.md5(path);
        let path_str = path.to_string_lossy();
        let Some(command) =
            Self::find_command(user, &path_str, Some(arguments), checksum.as_deref())
        else {
            return (Verdict::Denied(DenyReason::NoMatchingCommand), user_logging);
        };

        let logging = command
            .attribute::<Logging>(Some(user))
            .unwrap_or(user_logging);
        let verdict = if command.attribute::<Enabled>(None) == Some(false) {
            Verdict::Denied(DenyReason::CommandDisabled)
        } else if !command.time_window(user).contains(now) {
            Verdict::Denied(DenyReason::OutsideTimeWindow)
        } else if !self.network_admits(&command, user) {
            Verdict::Denied(DenyReason::NetworkNotAllowed)
        } else {
            Verdict::Allowed
        };
        (verdict, logging)
    }

    fn network_admits(&self, command: &CommandNode<'_>, user: &UserNode<'_>) -> bool {
        match command.attribute::<Networks>(Some(user)) {
            Some(networks) if !networks.is_empty() => {
                networks.admits(&self.host.hostname(), &self.host.addresses())
            }
            _ => true,
        }
    }

    /// [`AuthorizationProvider::verify_command`] at a fixed time of day.
    pub fn check_at(
        &self,
        user: &UserName,
        command: &str,
        arguments: &str,
        now: NaiveTime,
    ) -> Result<CommandDecision, SudoError> {
        let denied = |reason, path: PathBuf| CommandDecision {
            user: user.clone(),
            command_path: path,
            verdict: Verdict::Denied(reason),
            logging_level: None,
            matched_group: None,
        };

        if is_shell_builtin(command) {
            return Ok(denied(DenyReason::ShellBuiltin, PathBuf::from(command)));
        }
        let Some(path) = self.files.resolve(command) else {
            return Ok(denied(DenyReason::InvalidPath, PathBuf::from(command)));
        };

        let doc = self.store.snapshot()?;
        let Some(node) = self.find_user(&doc, user)? else {
            return Ok(denied(DenyReason::UserNotInPolicy, path));
        };

        let (verdict, logging) = self.evaluate(&node, &path, arguments, now);
        tracing::debug!(
            user = %user,
            command = %path.display(),
            allowed = verdict.is_allowed(),
            reason = verdict.deny_reason().map(DenyReason::as_str),
            "command checked"
        );
        Ok(CommandDecision {
            user: user.clone(),
            command_path: path,
            verdict,
            logging_level: Some(logging),
            matched_group: node.matched_group().cloned(),
        })
    }
}

impl AuthorizationProvider for AuthorizationEngine {
    fn user_info(&self, user: &UserName) -> Result<Option<UserInfo>, SudoError> {
        let doc = self.store.snapshot()?;
        let Some(node) = self.find_user(&doc, user)? else {
            return Ok(None);
        };
        Ok(Some(UserInfo {
            user: node.name().clone(),
            matched_group: node.matched_group().cloned(),
            invalid_logons: node.attribute::<InvalidLogons>(true),
            times_exceeded_invalid_logons: node.attribute::<TimesExceededInvalidLogons>(true),
            invalid_logon_timeout: node.attribute::<InvalidLogonTimeout>(true),
            lockout_timeout: node.attribute::<LockoutTimeout>(true),
            logon_timeout: node.attribute::<LogonTimeout>(true),
            privileges_group: node.attribute::<PrivilegesGroup>(true),
            logging_level: node.attribute::<Logging>(true).unwrap_or_default(),
        }))
    }

    fn verify_command(
        &self,
        user: &UserName,
        command: &str,
        arguments: &str,
    ) -> Result<CommandDecision, SudoError> {
        self.check_at(user, command, arguments, chrono::Local::now().time())
    }

    fn update(&self, force: bool) -> bool {
        self.store.update(force)
    }
}
