//! Interfaces to the OS-specific collaborators.
//!
//! ```text
//! AuthorizationEngine / SudoService
//!        │
//!        ├── AuthenticationProvider   verify a caller's secret
//!        ├── DirectoryProvider        find accounts, query and change group membership
//!        ├── ProcessLauncher          start a command as the user, wait for it
//!        └── HostInfo                 machine name, hostname, bound addresses
//! ```
//!
//! All of these are synchronous. Async callers run them on a blocking
//! pool. Fakes for tests live in [`crate::testing`].

use crate::error::{AuthError, DirectoryError, LaunchError};
use elevate_types::UserName;
use secrecy::SecretString;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::PathBuf;

/// Verifies caller credentials.
///
/// Implementations must never log or retain the secret.
pub trait AuthenticationProvider: Send + Sync {
    /// Returns `Ok(false)` for a wrong secret; `Err` only when the
    /// provider itself fails.
    fn verify_credentials(
        &self,
        domain: &str,
        user: &str,
        secret: &SecretString,
    ) -> Result<bool, AuthError>;
}

/// Kind of directory account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKind {
    User,
    Group,
}

/// Where to look an account up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryScope {
    /// Accounts of the local machine.
    Local,
    /// A directory domain.
    Domain(String),
}

/// An account found in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub kind: AccountKind,
    /// Provider-specific path identifying the account, usable as a
    /// membership argument.
    pub path: String,
}

impl DirectoryEntry {
    pub fn new(kind: AccountKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// OS group membership.
pub trait DirectoryProvider: Send + Sync {
    /// Looks an account up. A missing account is `Ok(None)`.
    fn find_entry(
        &self,
        scope: &DirectoryScope,
        name: &str,
        kind: AccountKind,
    ) -> Result<Option<DirectoryEntry>, DirectoryError>;

    /// Whether `member` (an entry path or `DOMAIN\name`) is a
    /// transitive member of `group`.
    fn is_member(&self, group: &DirectoryEntry, member: &str) -> Result<bool, DirectoryError>;

    fn add_member(&self, group: &DirectoryEntry, member: &str) -> Result<(), DirectoryError>;

    fn remove_member(&self, group: &DirectoryEntry, member: &str) -> Result<(), DirectoryError>;
}

/// A command to start under the requesting user's identity.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub user: UserName,
    pub command: PathBuf,
    pub arguments: String,
}

/// A started process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
}

/// Starts commands as the requesting user.
pub trait ProcessLauncher: Send + Sync {
    fn spawn_as_user(&self, request: &LaunchRequest) -> Result<ProcessHandle, LaunchError>;

    /// Blocks until the process exits and returns its exit code.
    fn wait_for_exit(&self, handle: ProcessHandle) -> Result<i32, LaunchError>;
}

/// Facts about the local host.
pub trait HostInfo: Send + Sync {
    /// Local machine (account authority) name.
    fn machine_name(&self) -> String;

    fn hostname(&self) -> String;

    /// Bound IP addresses, as strings.
    fn addresses(&self) -> Vec<String>;
}

/// [`HostInfo`] read from the running system.
#[derive(Debug, Clone, Default)]
pub struct SystemHost;

impl SystemHost {
    fn system_hostname() -> String {
        ["COMPUTERNAME", "HOSTNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| "localhost".to_string())
    }
}

impl HostInfo for SystemHost {
    fn machine_name(&self) -> String {
        let host = Self::system_hostname();
        host.split('.').next().unwrap_or(&host).to_uppercase()
    }

    fn hostname(&self) -> String {
        Self::system_hostname()
    }

    fn addresses(&self) -> Vec<String> {
        let mut out: Vec<String> = match (self.hostname().as_str(), 0).to_socket_addrs() {
            Ok(addrs) => addrs.map(|a| a.ip().to_string()).collect(),
            Err(e) => {
                tracing::debug!(error = %e, "hostname did not resolve");
                Vec::new()
            }
        };
        let loopback = IpAddr::from([127, 0, 0, 1]).to_string();
        if !out.contains(&loopback) {
            out.push(loopback);
        }
        out.dedup();
        out
    }
}
