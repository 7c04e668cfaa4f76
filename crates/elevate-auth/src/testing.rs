//! In-memory collaborators for tests.
//!
//! Every fake is thread-safe and records what it was asked to do, so
//! tests can assert on OS side effects (for example "zero membership
//! changes") without touching the machine.
//!
//! # Example
//!
//! ```ignore
//! use elevate_auth::testing::FakeDirectory;
//! use elevate_auth::{Membership, MembershipOp};
//! use elevate_types::{GroupName, UserName};
//! use std::sync::Arc;
//!
//! let dir = Arc::new(FakeDirectory::new("HOST"));
//! dir.add_local_user("alice");
//! dir.add_local_group("Administrators");
//!
//! let m = Membership::new(dir.clone(), "HOST");
//! let alice = UserName::parse("HOST\\alice").unwrap();
//! let admins = GroupName::parse("Administrators").unwrap();
//! assert!(!m.add_remove(&alice, &admins, MembershipOp::Add).unwrap());
//! assert!(dir.is_local_member("Administrators", "HOST\\alice"));
//! ```

use crate::error::{AuthError, DirectoryError, LaunchError};
use crate::files::CommandFiles;
use crate::provider::{
    AccountKind, AuthenticationProvider, DirectoryEntry, DirectoryProvider, DirectoryScope,
    HostInfo, LaunchRequest, ProcessHandle, ProcessLauncher,
};
use elevate_policy::{
    PolicyError, PolicyFormat, PolicySource, PolicyStore, PolicyStoreConfig, RawPolicy,
};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ── Directory ─────────────────────────────────────────────────────────

/// A membership change performed through [`FakeDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Added { group: String, member: String },
    Removed { group: String, member: String },
}

#[derive(Debug, Default)]
struct DirectoryState {
    /// `(scope, kind, name)` keys, lower-cased.
    accounts: HashSet<(String, AccountKind, String)>,
    /// Group path → member paths, lower-cased.
    members: HashMap<String, HashSet<String>>,
    mutations: Vec<Mutation>,
    fail_mutations: bool,
}

/// Directory with local and domain accounts held in memory.
///
/// Entry paths are `SCOPE\name`, where the scope is the machine name for
/// local accounts.
#[derive(Debug)]
pub struct FakeDirectory {
    machine: String,
    state: Mutex<DirectoryState>,
}

impl FakeDirectory {
    pub fn new(machine: impl Into<String>) -> Self {
        Self {
            machine: machine.into(),
            state: Mutex::new(DirectoryState::default()),
        }
    }

    fn scope_name(&self, scope: &DirectoryScope) -> String {
        match scope {
            DirectoryScope::Local => self.machine.to_lowercase(),
            DirectoryScope::Domain(d) => d.to_lowercase(),
        }
    }

    fn path(scope: &str, name: &str) -> String {
        format!("{scope}\\{name}").to_lowercase()
    }

    fn add_account(&self, scope: &DirectoryScope, kind: AccountKind, name: &str) -> String {
        let scope = self.scope_name(scope);
        let mut st = self.state.lock();
        st.accounts.insert((scope.clone(), kind, name.to_lowercase()));
        let path = Self::path(&scope, name);
        if kind == AccountKind::Group {
            st.members.entry(path.clone()).or_default();
        }
        path
    }

    pub fn add_local_user(&self, name: &str) {
        self.add_account(&DirectoryScope::Local, AccountKind::User, name);
    }

    pub fn add_local_group(&self, name: &str) {
        self.add_account(&DirectoryScope::Local, AccountKind::Group, name);
    }

    /// Adds `member` (`DOMAIN\name`) to a local group, without recording
    /// a mutation.
    pub fn add_local_member(&self, group: &str, member: &str) {
        let path = Self::path(&self.machine, group);
        self.state
            .lock()
            .members
            .entry(path)
            .or_default()
            .insert(member.to_lowercase());
    }

    /// Creates a domain group with the given domain users as members.
    pub fn add_domain_group(&self, domain: &str, group: &str, users: &[&str]) {
        let scope = DirectoryScope::Domain(domain.to_string());
        let group_path = self.add_account(&scope, AccountKind::Group, group);
        for user in users {
            let user_path = self.add_account(&scope, AccountKind::User, user);
            self.state
                .lock()
                .members
                .entry(group_path.clone())
                .or_default()
                .insert(user_path);
        }
    }

    #[must_use]
    pub fn is_local_member(&self, group: &str, member: &str) -> bool {
        let path = Self::path(&self.machine, group);
        self.state
            .lock()
            .members
            .get(&path)
            .is_some_and(|m| m.contains(&member.to_lowercase()))
    }

    /// Makes every add/remove fail until reset.
    pub fn fail_mutations(&self, fail: bool) {
        self.state.lock().fail_mutations = fail;
    }

    #[must_use]
    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().mutations.clone()
    }

    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.state.lock().mutations.len()
    }
}

impl DirectoryProvider for FakeDirectory {
    fn find_entry(
        &self,
        scope: &DirectoryScope,
        name: &str,
        kind: AccountKind,
    ) -> Result<Option<DirectoryEntry>, DirectoryError> {
        let scope = self.scope_name(scope);
        let found = self
            .state
            .lock()
            .accounts
            .contains(&(scope.clone(), kind, name.to_lowercase()));
        Ok(found.then(|| DirectoryEntry::new(kind, Self::path(&scope, name))))
    }

    fn is_member(&self, group: &DirectoryEntry, member: &str) -> Result<bool, DirectoryError> {
        Ok(self
            .state
            .lock()
            .members
            .get(&group.path)
            .is_some_and(|m| m.contains(&member.to_lowercase())))
    }

    fn add_member(&self, group: &DirectoryEntry, member: &str) -> Result<(), DirectoryError> {
        let mut st = self.state.lock();
        if st.fail_mutations {
            return Err(DirectoryError::operation("add", &group.path, member, "access denied"));
        }
        st.members
            .entry(group.path.clone())
            .or_default()
            .insert(member.to_lowercase());
        st.mutations.push(Mutation::Added {
            group: group.path.clone(),
            member: member.to_lowercase(),
        });
        Ok(())
    }

    fn remove_member(&self, group: &DirectoryEntry, member: &str) -> Result<(), DirectoryError> {
        let mut st = self.state.lock();
        if st.fail_mutations {
            return Err(DirectoryError::operation("remove", &group.path, member, "access denied"));
        }
        if let Some(m) = st.members.get_mut(&group.path) {
            m.remove(&member.to_lowercase());
        }
        st.mutations.push(Mutation::Removed {
            group: group.path.clone(),
            member: member.to_lowercase(),
        });
        Ok(())
    }
}

// ── Files, host ───────────────────────────────────────────────────────

/// Command files known by exact (case-insensitive) name.
#[derive(Debug, Default)]
pub struct FakeFiles {
    paths: Mutex<HashMap<String, PathBuf>>,
    sums: Mutex<HashMap<PathBuf, String>>,
}

impl FakeFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file resolvable by its own path.
    pub fn add(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.alias(path.to_string_lossy().as_ref(), path.clone());
    }

    /// Makes `command` resolve to `path`.
    pub fn alias(&self, command: &str, path: impl Into<PathBuf>) {
        self.paths.lock().insert(command.to_lowercase(), path.into());
    }

    pub fn set_md5(&self, path: impl Into<PathBuf>, sum: &str) {
        self.sums.lock().insert(path.into(), sum.to_string());
    }
}

impl CommandFiles for FakeFiles {
    fn resolve(&self, command: &str) -> Option<PathBuf> {
        self.paths.lock().get(&command.to_lowercase()).cloned()
    }

    fn md5(&self, path: &Path) -> Option<String> {
        self.sums.lock().get(path).cloned()
    }
}

/// Fixed host facts.
#[derive(Debug, Clone)]
pub struct FakeHost {
    machine: String,
    hostname: String,
    addresses: Vec<String>,
}

impl FakeHost {
    pub fn new(machine: &str, hostname: &str, addresses: &[&str]) -> Self {
        Self {
            machine: machine.to_string(),
            hostname: hostname.to_string(),
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl HostInfo for FakeHost {
    fn machine_name(&self) -> String {
        self.machine.clone()
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn addresses(&self) -> Vec<String> {
        self.addresses.clone()
    }
}

// ── Authentication ────────────────────────────────────────────────────

/// Accepts a fixed secret per `DOMAIN\user`.
#[derive(Debug, Default)]
pub struct FakeAuthenticator {
    secrets: Mutex<HashMap<String, SecretString>>,
    calls: AtomicUsize,
}

impl FakeAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_secret(&self, domain: &str, user: &str, secret: &str) {
        self.secrets.lock().insert(
            format!("{domain}\\{user}").to_lowercase(),
            SecretString::from(secret.to_string()),
        );
    }

    /// Number of verification calls made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AuthenticationProvider for FakeAuthenticator {
    fn verify_credentials(
        &self,
        domain: &str,
        user: &str,
        secret: &SecretString,
    ) -> Result<bool, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = format!("{domain}\\{user}").to_lowercase();
        Ok(self
            .secrets
            .lock()
            .get(&key)
            .is_some_and(|s| s.expose_secret() == secret.expose_secret()))
    }
}

// ── Process launcher ──────────────────────────────────────────────────

type Observer = Arc<dyn Fn(&LaunchRequest) + Send + Sync>;

#[derive(Debug, Default)]
struct LauncherState {
    next_pid: u32,
    running: HashMap<u32, LaunchRequest>,
    launched: Vec<LaunchRequest>,
}

/// Launcher that runs nothing.
///
/// An observer, if set, is called from [`ProcessLauncher::wait_for_exit`]
/// while the "process" is alive; it may block to simulate run time.
#[derive(Default)]
pub struct FakeLauncher {
    state: Mutex<LauncherState>,
    exit_code: i32,
    fail_spawn: bool,
    observer: Option<Observer>,
}

impl std::fmt::Debug for FakeLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeLauncher")
            .field("exit_code", &self.exit_code)
            .field("fail_spawn", &self.fail_spawn)
            .finish_non_exhaustive()
    }
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Every spawn fails.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_spawn = true;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, f: impl Fn(&LaunchRequest) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn launched(&self) -> Vec<LaunchRequest> {
        self.state.lock().launched.clone()
    }

    #[must_use]
    pub fn running(&self) -> usize {
        self.state.lock().running.len()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn_as_user(&self, request: &LaunchRequest) -> Result<ProcessHandle, LaunchError> {
        if self.fail_spawn {
            return Err(LaunchError::spawn(&request.command, "simulated spawn failure"));
        }
        let mut st = self.state.lock();
        st.next_pid += 1;
        let pid = st.next_pid;
        st.running.insert(pid, request.clone());
        st.launched.push(request.clone());
        Ok(ProcessHandle { pid })
    }

    fn wait_for_exit(&self, handle: ProcessHandle) -> Result<i32, LaunchError> {
        let request = self
            .state
            .lock()
            .running
            .get(&handle.pid)
            .cloned()
            .ok_or_else(|| LaunchError::wait(handle.pid, "no such process"))?;
        if let Some(observer) = &self.observer {
            observer(&request);
        }
        self.state.lock().running.remove(&handle.pid);
        Ok(self.exit_code)
    }
}

// ── Policy ────────────────────────────────────────────────────────────

/// Policy source serving a fixed body.
#[derive(Debug, Clone)]
pub struct StaticSource {
    body: String,
    format: PolicyFormat,
}

impl StaticSource {
    pub fn new(body: impl Into<String>, format: PolicyFormat) -> Self {
        Self {
            body: body.into(),
            format,
        }
    }
}

impl PolicySource for StaticSource {
    fn describe(&self) -> String {
        "static".to_string()
    }

    fn fetch(&self) -> Result<RawPolicy, PolicyError> {
        Ok(RawPolicy {
            body: self.body.clone(),
            format: self.format,
        })
    }
}

/// Uncached store serving a JSON document.
pub fn store_from_json(body: &str, machine: &str) -> Arc<PolicyStore> {
    let config = PolicyStoreConfig {
        cache_enabled: false,
        ..PolicyStoreConfig::default()
    };
    Arc::new(PolicyStore::with_source(
        config,
        machine,
        Box::new(StaticSource::new(body, PolicyFormat::Json)),
    ))
}
