//! Configuration types.

use elevate_policy::PolicyStoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Root service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Policy store settings.
    pub policy: PolicyStoreConfig,
    pub grant: GrantConfig,
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
    pub audit: AuditConfig,
}

impl ServiceConfig {
    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Serializes to a pretty TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Merges `other` into `self`.
    ///
    /// Fields of `other` that differ from the default override.
    pub fn merge(&mut self, other: &Self) {
        merge_policy(&mut self.policy, &other.policy);
        self.grant.merge(&other.grant);
        self.credentials.merge(&other.credentials);
        self.logging.merge(&other.logging);
        self.audit.merge(&other.audit);
    }
}

macro_rules! merge_changed {
    ($dst:expr, $src:expr, $default:expr; $($field:ident),+ $(,)?) => {
        $(
            if $src.$field != $default.$field {
                $dst.$field = $src.$field.clone();
            }
        )+
    };
}

fn merge_policy(dst: &mut PolicyStoreConfig, src: &PolicyStoreConfig) {
    let default = PolicyStoreConfig::default();
    merge_changed!(dst, src, default;
        primary_source_uri,
        cache_enabled,
        cache_use_as_primary,
        cache_use_stale_cache,
        cache_update_frequency,
        cache_file_path,
        schema_uri,
        fetch_timeout,
    );
}

/// When the privilege grant is revoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevokeStrategy {
    /// Run the command, wait for it to exit, then revoke.
    #[default]
    Synchronous,
    /// Return immediately; revoke after a fixed delay.
    Deferred,
}

impl FromStr for RevokeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "synchronous" | "sync" => Ok(Self::Synchronous),
            "deferred" => Ok(Self::Deferred),
            other => Err(format!("unknown revoke strategy '{other}'")),
        }
    }
}

/// Privilege grant settings (`[grant]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GrantConfig {
    pub strategy: RevokeStrategy,
    /// Seconds before a deferred revoke fires.
    pub deferred_delay: u64,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            strategy: RevokeStrategy::Synchronous,
            deferred_delay: 30,
        }
    }
}

impl GrantConfig {
    #[must_use]
    pub fn deferred_delay(&self) -> Duration {
        Duration::from_secs(self.deferred_delay)
    }

    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        merge_changed!(self, other, default; strategy, deferred_delay);
    }
}

/// Credentials cache settings (`[credentials]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Remember successful logons for `logonTimeout` seconds.
    pub cache_enabled: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
        }
    }
}

impl CredentialsConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();
        merge_changed!(self, other, default; cache_enabled);
    }
}

/// Diagnostic log settings (`[logging]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append diagnostic logs to this file as well.
    pub file: Option<PathBuf>,
    /// Level filter for the file layer.
    pub file_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            file_level: "info".into(),
        }
    }
}

impl LoggingConfig {
    fn merge(&mut self, other: &Self) {
        if other.file.is_some() {
            self.file = other.file.clone();
        }
        let default = Self::default();
        merge_changed!(self, other, default; file_level);
    }
}

/// Audit sink settings (`[audit]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditConfig {
    /// Emit audit records as `tracing` events.
    pub tracing: bool,
    /// Append audit records as JSON lines to this file.
    pub json_lines_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            tracing: true,
            json_lines_path: None,
        }
    }
}

impl AuditConfig {
    fn merge(&mut self, other: &Self) {
        if other.json_lines_path.is_some() {
            self.json_lines_path = other.json_lines_path.clone();
        }
        let default = Self::default();
        merge_changed!(self, other, default; tracing);
    }
}
