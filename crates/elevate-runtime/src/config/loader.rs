//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Global config (`/etc/elevate/config.toml`, or `$ELEVATE_CONFIG`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`ELEVATE_*`)
//!
//! Each layer overrides the previous.

use super::{default_config_path, ConfigError, RevokeStrategy, ServiceConfig, CONFIG_PATH_ENV};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parses a boolean variable into `$field` when it is set.
macro_rules! parse_env_bool {
    ($lookup:expr, $field:expr, $var:literal) => {
        if let Some(val) = $lookup($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Parses a `u64` variable into `$field` when it is set.
macro_rules! parse_env_u64 {
    ($lookup:expr, $field:expr, $var:literal) => {
        if let Some(val) = $lookup($var) {
            $field = val
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::invalid_env_var($var, "expected unsigned integer"))?;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```ignore
/// use elevate_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_config_file("/srv/elevate/config.toml")
///     .skip_env_vars()
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Global config file path (defaults to `/etc/elevate/config.toml`).
    global_config_path: Option<PathBuf>,

    /// Explicit config file; must exist when set.
    config_file: Option<PathBuf>,

    skip_env: bool,
    skip_global: bool,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Adds an explicit config file layered over the global one.
    ///
    /// Unlike the global file, a missing explicit file is an error.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    ///
    /// Useful for testing with deterministic config.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a config file exists but cannot be
    /// parsed, the explicit file is missing, or an `ELEVATE_*` variable
    /// holds an invalid value.
    pub fn load(&self) -> Result<ServiceConfig, ConfigError> {
        let mut config = ServiceConfig::default();

        // Layer 1: Global config
        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .or_else(|| {
                    (!self.skip_env)
                        .then(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
                        .flatten()
                })
                .unwrap_or_else(default_config_path);

            if let Some(global_config) = load_file(&global_path)? {
                debug!(path = %global_path.display(), "Loaded global config");
                config.merge(&global_config);
            }
        }

        // Layer 2: Explicit config file
        if let Some(ref path) = self.config_file {
            let explicit = load_file(path)?.ok_or_else(|| {
                ConfigError::read_file(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                )
            })?;
            debug!(path = %path.display(), "Loaded config file");
            config.merge(&explicit);
        }

        // Layer 3: Environment variables
        if !self.skip_env {
            apply_env_vars(&mut config, |name| std::env::var(name).ok())?;
        }

        Ok(config)
    }
}

/// Loads a config file, returning None if it doesn't exist.
fn load_file(path: &Path) -> Result<Option<ServiceConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let config =
        ServiceConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;

    Ok(Some(config))
}

/// Applies `ELEVATE_*` overrides read through `lookup`.
fn apply_env_vars<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Policy store
    if let Some(val) = lookup("ELEVATE_POLICY_URI") {
        config.policy.primary_source_uri = val;
    }
    if let Some(val) = lookup("ELEVATE_SCHEMA_URI") {
        config.policy.schema_uri = val;
    }
    if let Some(val) = lookup("ELEVATE_CACHE_FILE") {
        config.policy.cache_file_path = PathBuf::from(val);
    }
    parse_env_bool!(lookup, config.policy.cache_enabled, "ELEVATE_CACHE_ENABLED");
    parse_env_bool!(lookup, config.policy.cache_use_as_primary, "ELEVATE_CACHE_USE_AS_PRIMARY");
    parse_env_bool!(lookup, config.policy.cache_use_stale_cache, "ELEVATE_CACHE_USE_STALE");
    parse_env_u64!(lookup, config.policy.cache_update_frequency, "ELEVATE_CACHE_UPDATE_FREQUENCY");

    // Grants
    if let Some(val) = lookup("ELEVATE_REVOKE_STRATEGY") {
        config.grant.strategy = val
            .parse::<RevokeStrategy>()
            .map_err(|message| ConfigError::invalid_env_var("ELEVATE_REVOKE_STRATEGY", message))?;
    }
    parse_env_u64!(lookup, config.grant.deferred_delay, "ELEVATE_REVOKE_DELAY");

    parse_env_bool!(lookup, config.credentials.cache_enabled, "ELEVATE_CREDENTIALS_CACHE");

    // Output paths
    if let Some(val) = lookup("ELEVATE_LOG_FILE") {
        config.logging.file = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("ELEVATE_AUDIT_FILE") {
        config.audit.json_lines_path = Some(PathBuf::from(val));
    }

    Ok(())
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off"
/// (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn explicit_file_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = create_config_file(
            temp.path(),
            "global.toml",
            r#"
[policy]
primary_source_uri = "https://policy.corp/global.json"
cache_use_as_primary = true

[grant]
deferred_delay = 5
"#,
        );
        let explicit = create_config_file(
            temp.path(),
            "explicit.toml",
            r#"
[policy]
primary_source_uri = "/srv/policy.json"
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&global)
            .with_config_file(&explicit)
            .skip_env_vars()
            .load()
            .unwrap();

        assert_eq!(config.policy.primary_source_uri, "/srv/policy.json");
        assert!(config.policy.cache_use_as_primary);
        assert_eq!(config.grant.deferred_delay, 5);
    }

    #[test]
    fn missing_global_is_ok_missing_explicit_is_not() {
        let config = ConfigLoader::new()
            .with_global_config("/nonexistent/path/config.toml")
            .skip_env_vars()
            .load()
            .unwrap();
        assert_eq!(config, ServiceConfig::default());

        let err = ConfigLoader::new()
            .skip_global_config()
            .with_config_file("/nonexistent/explicit.toml")
            .skip_env_vars()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = create_config_file(temp.path(), "bad.toml", "[grant\nstrategy = ");
        let err = ConfigLoader::new()
            .with_global_config(&path)
            .skip_env_vars()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn env_overrides() {
        let mut config = ServiceConfig::default();
        apply_env_vars(
            &mut config,
            env(&[
                ("ELEVATE_POLICY_URI", "file:///srv/policy.json"),
                ("ELEVATE_CACHE_ENABLED", "off"),
                ("ELEVATE_CACHE_UPDATE_FREQUENCY", "600"),
                ("ELEVATE_REVOKE_STRATEGY", "deferred"),
                ("ELEVATE_REVOKE_DELAY", "12"),
                ("ELEVATE_AUDIT_FILE", "/var/log/elevate/audit.jsonl"),
            ]),
        )
        .unwrap();

        assert_eq!(config.policy.primary_source_uri, "file:///srv/policy.json");
        assert!(!config.policy.cache_enabled);
        assert_eq!(config.policy.cache_update_frequency, 600);
        assert_eq!(config.grant.strategy, RevokeStrategy::Deferred);
        assert_eq!(config.grant.deferred_delay, 12);
        assert_eq!(
            config.audit.json_lines_path,
            Some(PathBuf::from("/var/log/elevate/audit.jsonl"))
        );
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let mut config = ServiceConfig::default();
        let err = apply_env_vars(&mut config, env(&[("ELEVATE_CACHE_USE_STALE", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref name, .. } if name == "ELEVATE_CACHE_USE_STALE"));

        let err = apply_env_vars(&mut config, env(&[("ELEVATE_REVOKE_DELAY", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));

        let err = apply_env_vars(&mut config, env(&[("ELEVATE_REVOKE_STRATEGY", "never")]))
            .unwrap_err();
        assert!(err.to_string().contains("unknown revoke strategy"));
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));

        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));

        assert_eq!(parse_bool("invalid"), None);
    }
}
