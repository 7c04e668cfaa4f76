//! Account resolution and group membership on top of a
//! [`DirectoryProvider`].
//!
//! Local accounts are resolved to their directory entry; accounts of
//! another domain are addressed as `DOMAIN\name` without a lookup.

use crate::error::SudoError;
use crate::provider::{AccountKind, DirectoryEntry, DirectoryProvider, DirectoryScope};
use elevate_types::{GroupName, UserName};
use std::sync::Arc;

/// Requested membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOp {
    Add,
    Remove,
}

/// Membership queries and changes for one machine.
#[derive(Clone)]
pub struct Membership {
    directory: Arc<dyn DirectoryProvider>,
    machine: String,
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membership")
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

impl Membership {
    pub fn new(directory: Arc<dyn DirectoryProvider>, machine: impl Into<String>) -> Self {
        Self {
            directory,
            machine: machine.into(),
        }
    }

    #[must_use]
    pub fn machine(&self) -> &str {
        &self.machine
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn DirectoryProvider> {
        &self.directory
    }

    /// Finds a group among the local machine's accounts.
    ///
    /// # Errors
    ///
    /// [`SudoError::GroupNotFound`] if it does not exist.
    pub fn local_group(&self, group: &GroupName) -> Result<DirectoryEntry, SudoError> {
        self.directory
            .find_entry(&DirectoryScope::Local, group.name(), AccountKind::Group)?
            .ok_or_else(|| SudoError::group_not_found(group))
    }

    /// Membership argument for `user`.
    ///
    /// # Errors
    ///
    /// [`SudoError::UsernameNotFound`] for a local user that does not
    /// exist.
    pub fn member_path(&self, user: &UserName) -> Result<String, SudoError> {
        if !user.is_local(&self.machine) {
            return Ok(user.to_string());
        }
        self.directory
            .find_entry(&DirectoryScope::Local, user.name(), AccountKind::User)?
            .map(|entry| entry.path)
            .ok_or_else(|| {
                SudoError::username_not_found(user.domain().unwrap_or(&self.machine), user.name())
            })
    }

    /// Adds `user` to or removes them from the local `group`.
    ///
    /// Only mutates when needed: add skips current members, remove
    /// skips non-members. Returns whether `user` was a member before
    /// the call.
    ///
    /// # Errors
    ///
    /// Lookup failures and directory errors. Nothing is changed when an
    /// error is returned.
    pub fn add_remove(
        &self,
        user: &UserName,
        group: &GroupName,
        op: MembershipOp,
    ) -> Result<bool, SudoError> {
        let entry = self.local_group(group)?;
        let member = self.member_path(user)?;
        let was_member = self.directory.is_member(&entry, &member)?;

        match (op, was_member) {
            (MembershipOp::Add, false) => {
                self.directory.add_member(&entry, &member)?;
                tracing::info!(user = %user, group = %group, "added to privileges group");
            }
            (MembershipOp::Remove, true) => {
                self.directory.remove_member(&entry, &member)?;
                tracing::info!(user = %user, group = %group, "removed from privileges group");
            }
            _ => {
                tracing::debug!(user = %user, group = %group, ?op, was_member, "membership unchanged");
            }
        }
        Ok(was_member)
    }

    /// Whether `user` is a transitive member of the policy group `group`.
    ///
    /// Local groups (no domain, or the machine's name as domain) are
    /// looked up on this machine; anything else in the group's domain.
    /// Returns `Ok(None)` when a domain lookup finds no such group or
    /// user: the caller stops searching.
    ///
    /// # Errors
    ///
    /// [`SudoError::GroupNotFound`] for a missing local group,
    /// [`SudoError::UsernameNotFound`] for a missing local user.
    pub fn is_member_of(&self, user: &UserName, group: &GroupName) -> Result<Option<bool>, SudoError> {
        if group.is_local(&self.machine) {
            let entry = self.local_group(group)?;
            let member = self.member_path(user)?;
            return Ok(Some(self.directory.is_member(&entry, &member)?));
        }

        let scope = DirectoryScope::Domain(group.domain().unwrap_or_default().to_string());
        let Some(entry) = self
            .directory
            .find_entry(&scope, group.name(), AccountKind::Group)?
        else {
            tracing::debug!(group = %group, "directory group not found");
            return Ok(None);
        };
        let Some(member) = self
            .directory
            .find_entry(&scope, user.name(), AccountKind::User)?
        else {
            tracing::debug!(user = %user, "directory user not found");
            return Ok(None);
        };
        Ok(Some(self.directory.is_member(&entry, &member.path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDirectory;

    fn user(s: &str) -> UserName {
        UserName::parse(s).unwrap()
    }

    fn group(s: &str) -> GroupName {
        GroupName::parse(s).unwrap()
    }

    fn setup() -> (Arc<FakeDirectory>, Membership) {
        let dir = Arc::new(FakeDirectory::new("HOST"));
        dir.add_local_user("alice");
        dir.add_local_group("Administrators");
        let m = Membership::new(dir.clone(), "HOST");
        (dir, m)
    }

    #[test]
    fn add_is_idempotent() {
        let (dir, m) = setup();
        let alice = user("HOST\\alice");
        let admins = group("Administrators");

        assert!(!m.add_remove(&alice, &admins, MembershipOp::Add).unwrap());
        assert_eq!(dir.mutation_count(), 1);
        assert!(m.add_remove(&alice, &admins, MembershipOp::Add).unwrap());
        assert!(m.add_remove(&alice, &admins, MembershipOp::Add).unwrap());
        assert_eq!(dir.mutation_count(), 1);
    }

    #[test]
    fn remove_of_non_member_does_nothing() {
        let (dir, m) = setup();
        let was = m
            .add_remove(&user("HOST\\alice"), &group("Administrators"), MembershipOp::Remove)
            .unwrap();
        assert!(!was);
        assert_eq!(dir.mutation_count(), 0);
    }

    #[test]
    fn missing_group_and_user_are_errors() {
        let (dir, m) = setup();
        let err = m
            .add_remove(&user("HOST\\alice"), &group("Wheel"), MembershipOp::Add)
            .unwrap_err();
        assert!(matches!(err, SudoError::GroupNotFound { ref group } if group == "Wheel"));

        let err = m
            .add_remove(&user("host\\carol"), &group("Administrators"), MembershipOp::Add)
            .unwrap_err();
        assert_eq!(err.to_string(), "Username host\\carol not found");
        assert_eq!(dir.mutation_count(), 0);
    }

    #[test]
    fn domain_users_are_addressed_by_name() {
        let (dir, m) = setup();
        m.add_remove(&user("CORP\\bob"), &group("Administrators"), MembershipOp::Add)
            .unwrap();
        assert!(dir.is_local_member("Administrators", "CORP\\bob"));
    }

    #[test]
    fn domain_group_miss_is_none() {
        let (dir, m) = setup();
        dir.add_domain_group("CORP", "Devs", &["carol"]);
        assert_eq!(
            m.is_member_of(&user("CORP\\carol"), &group("CORP\\Devs")).unwrap(),
            Some(true)
        );
        assert_eq!(
            m.is_member_of(&user("CORP\\carol"), &group("CORP\\Ops")).unwrap(),
            None
        );
        assert_eq!(
            m.is_member_of(&user("CORP\\zed"), &group("CORP\\Devs")).unwrap(),
            None
        );
    }
}
