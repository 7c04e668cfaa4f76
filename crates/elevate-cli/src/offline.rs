//! Collaborators for checking a policy without touching the OS.
//!
//! `elevate check` never changes group membership. Group membership is
//! whatever `--member-of` says, every account exists, and mutations
//! fail.

use elevate_auth::{
    AccountKind, DirectoryEntry, DirectoryError, DirectoryProvider, DirectoryScope, HostInfo,
    SystemHost,
};
use std::collections::HashSet;

/// Read-only directory answering membership from a fixed group list.
#[derive(Debug)]
pub struct StaticDirectory {
    machine: String,
    /// Lower-cased group names and `SCOPE\name` paths.
    groups: HashSet<String>,
}

impl StaticDirectory {
    pub fn new<I, S>(machine: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            machine: machine.into(),
            groups: groups
                .into_iter()
                .map(|g| g.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl DirectoryProvider for StaticDirectory {
    fn find_entry(
        &self,
        scope: &DirectoryScope,
        name: &str,
        kind: AccountKind,
    ) -> Result<Option<DirectoryEntry>, DirectoryError> {
        let scope = match scope {
            DirectoryScope::Local => self.machine.as_str(),
            DirectoryScope::Domain(domain) => domain.as_str(),
        };
        Ok(Some(DirectoryEntry::new(kind, format!("{scope}\\{name}"))))
    }

    fn is_member(&self, group: &DirectoryEntry, _member: &str) -> Result<bool, DirectoryError> {
        let path = group.path.to_lowercase();
        let name = path.rsplit('\\').next().unwrap_or(&path);
        Ok(self.groups.contains(&path) || self.groups.contains(name))
    }

    fn add_member(&self, group: &DirectoryEntry, _member: &str) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unavailable(format!(
            "offline directory cannot change '{}'",
            group.path
        )))
    }

    fn remove_member(&self, group: &DirectoryEntry, member: &str) -> Result<(), DirectoryError> {
        self.add_member(group, member)
    }
}

/// [`SystemHost`] with an optional machine name override.
#[derive(Debug, Clone, Default)]
pub struct OfflineHost {
    machine: Option<String>,
}

impl OfflineHost {
    pub fn new(machine: Option<String>) -> Self {
        Self { machine }
    }
}

impl HostInfo for OfflineHost {
    fn machine_name(&self) -> String {
        self.machine
            .clone()
            .unwrap_or_else(|| SystemHost.machine_name())
    }

    fn hostname(&self) -> String {
        SystemHost.hostname()
    }

    fn addresses(&self) -> Vec<String> {
        SystemHost.addresses()
    }
}
