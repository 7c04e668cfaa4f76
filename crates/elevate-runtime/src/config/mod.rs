//! Service configuration with hierarchical layering.
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌──────────────────────────────────────────────┐
//! │  1. Environment Variables (ELEVATE_*)        │  Runtime override
//! ├──────────────────────────────────────────────┤
//! │  2. Explicit config file (--config)          │  Per invocation
//! ├──────────────────────────────────────────────┤
//! │  3. Global config (/etc/elevate/config.toml) │  Machine defaults
//! ├──────────────────────────────────────────────┤
//! │  4. Default Values (compile-time)            │  Fallback
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `ELEVATE_CONFIG` | global config path | PathBuf |
//! | `ELEVATE_POLICY_URI` | `policy.primary_source_uri` | String |
//! | `ELEVATE_SCHEMA_URI` | `policy.schema_uri` | String |
//! | `ELEVATE_CACHE_ENABLED` | `policy.cache_enabled` | bool |
//! | `ELEVATE_CACHE_FILE` | `policy.cache_file_path` | PathBuf |
//! | `ELEVATE_CACHE_USE_AS_PRIMARY` | `policy.cache_use_as_primary` | bool |
//! | `ELEVATE_CACHE_USE_STALE` | `policy.cache_use_stale_cache` | bool |
//! | `ELEVATE_CACHE_UPDATE_FREQUENCY` | `policy.cache_update_frequency` | u64 |
//! | `ELEVATE_REVOKE_STRATEGY` | `grant.strategy` | synchronous / deferred |
//! | `ELEVATE_REVOKE_DELAY` | `grant.deferred_delay` | u64 |
//! | `ELEVATE_CREDENTIALS_CACHE` | `credentials.cache_enabled` | bool |
//! | `ELEVATE_LOG_FILE` | `logging.file` | PathBuf |
//! | `ELEVATE_AUDIT_FILE` | `audit.json_lines_path` | PathBuf |
//!
//! # Example Configuration
//!
//! ```toml
//! [policy]
//! primary_source_uri = "https://policy.corp.example/sudoers.json"
//! cache_enabled = true
//! cache_use_as_primary = false
//! cache_use_stale_cache = true
//! cache_update_frequency = 86400
//! cache_file_path = "/var/cache/elevate/policy.json"
//!
//! [grant]
//! strategy = "synchronous"
//! deferred_delay = 30
//!
//! [credentials]
//! cache_enabled = true
//!
//! [logging]
//! file = "/var/log/elevate/elevate.log"
//! file_level = "info"
//!
//! [audit]
//! tracing = true
//! json_lines_path = "/var/log/elevate/audit.jsonl"
//! ```

mod error;
mod loader;
mod resolver;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use resolver::{ConfigResolver, NoOpResolver};
pub use types::{
    AuditConfig, CredentialsConfig, GrantConfig, LoggingConfig, RevokeStrategy, ServiceConfig,
};

/// Environment variable naming the global config file.
pub const CONFIG_PATH_ENV: &str = "ELEVATE_CONFIG";

/// Default global config file path.
#[must_use]
pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("/etc/elevate/config.toml")
}
