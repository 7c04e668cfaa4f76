//! Configuration resolver trait for layered overrides.
//!
//! ```text
//! ConfigLoader.load()  →  ServiceConfig (base)
//!                              │
//!                              ▼
//!                     ConfigResolver.apply()
//!                              │
//!                              ▼
//!                     ServiceConfig (final)
//! ```
//!
//! The CLI implements this for its flags (`--policy`, `--no-cache`, ...).

use super::ServiceConfig;

/// Applies overrides to a loaded configuration.
pub trait ConfigResolver {
    /// Applies overrides to the given configuration.
    ///
    /// Only values the resolver actually holds should be applied,
    /// preserving existing values for unspecified options.
    fn apply(&self, config: &mut ServiceConfig);
}

/// No-op resolver that makes no changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpResolver;

impl ConfigResolver for NoOpResolver {
    fn apply(&self, _config: &mut ServiceConfig) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RevokeStrategy;

    #[test]
    fn noop_resolver_does_nothing() {
        let mut config = ServiceConfig::default();
        let original = config.clone();

        NoOpResolver.apply(&mut config);

        assert_eq!(config, original);
    }

    #[test]
    fn custom_resolver() {
        struct Flags {
            policy: Option<String>,
            deferred: bool,
        }

        impl ConfigResolver for Flags {
            fn apply(&self, config: &mut ServiceConfig) {
                if let Some(ref uri) = self.policy {
                    config.policy.primary_source_uri = uri.clone();
                }
                if self.deferred {
                    config.grant.strategy = RevokeStrategy::Deferred;
                }
            }
        }

        let mut config = ServiceConfig::default();
        Flags {
            policy: Some("/tmp/policy.json".into()),
            deferred: false,
        }
        .apply(&mut config);

        assert_eq!(config.policy.primary_source_uri, "/tmp/policy.json");
        assert_eq!(config.grant.strategy, RevokeStrategy::Synchronous);
    }
}
