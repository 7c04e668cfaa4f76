//! Caller authentication with an invalid-logon counter and lockout.
//!
//! One entry per user, all behind a single lock. The lock is never held
//! across the call to the [`AuthenticationProvider`].
//!
//! Per user:
//!
//! - a successful logon is remembered for `logonTimeout` seconds; later
//!   requests in that window skip verification
//! - each rejected secret bumps the invalid-logon counter; reaching
//!   `invalidLogons` returns `TooManyInvalidLogons`, resets the counter
//!   and bumps the exceeded counter. For `invalidLogonTimeout` seconds
//!   after that every request is refused without verification
//! - the exceeded counter reaching `timesExceededInvalidLogons` locks
//!   the user out for `lockoutTimeout` seconds (until [`reset`] when
//!   unset)
//!
//! A missing or non-positive limit disables the rule it drives.
//!
//! [`reset`]: CredentialsCache::reset

use elevate_auth::{AuthenticationProvider, SudoError, UserInfo};
use elevate_types::UserName;
use parking_lot::Mutex;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Limits and timeouts driving the cache for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialPolicy {
    pub invalid_logons: Option<u32>,
    pub times_exceeded_invalid_logons: Option<u32>,
    pub invalid_logon_timeout: Option<Duration>,
    pub lockout_timeout: Option<Duration>,
    pub logon_timeout: Option<Duration>,
}

fn positive_limit(v: Option<i32>) -> Option<u32> {
    v.filter(|n| *n > 0).map(|n| n as u32)
}

fn seconds(v: Option<u64>) -> Option<Duration> {
    v.filter(|s| *s > 0).map(Duration::from_secs)
}

impl From<&UserInfo> for CredentialPolicy {
    fn from(info: &UserInfo) -> Self {
        Self {
            invalid_logons: positive_limit(info.invalid_logons),
            times_exceeded_invalid_logons: positive_limit(info.times_exceeded_invalid_logons),
            invalid_logon_timeout: seconds(info.invalid_logon_timeout),
            lockout_timeout: seconds(info.lockout_timeout),
            logon_timeout: seconds(info.logon_timeout),
        }
    }
}

#[derive(Debug, Default)]
struct CacheEntry {
    invalid_logon_count: u32,
    times_exceeded: u32,
    /// Cached successful logon.
    valid_until: Option<Instant>,
    /// Cool-down after exceeding the invalid-logon limit.
    cooldown_until: Option<Instant>,
    /// `Some(None)` is an open-ended lockout.
    locked_until: Option<Option<Instant>>,
}

impl CacheEntry {
    fn expire(&mut self, now: Instant) {
        if self.valid_until.is_some_and(|t| t <= now) {
            self.valid_until = None;
        }
        if self.cooldown_until.is_some_and(|t| t <= now) {
            self.cooldown_until = None;
        }
        if let Some(Some(t)) = self.locked_until {
            if t <= now {
                *self = Self::default();
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.invalid_logon_count == 0
            && self.times_exceeded == 0
            && self.valid_until.is_none()
            && self.cooldown_until.is_none()
            && self.locked_until.is_none()
    }
}

/// Authenticates callers and tracks their logon history.
pub struct CredentialsCache {
    authenticator: Arc<dyn AuthenticationProvider>,
    machine: String,
    remember_logons: bool,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl std::fmt::Debug for CredentialsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsCache")
            .field("machine", &self.machine)
            .field("remember_logons", &self.remember_logons)
            .field("entries", &self.entries.lock().len())
            .finish_non_exhaustive()
    }
}

impl CredentialsCache {
    /// `remember_logons` enables the `logonTimeout` window.
    pub fn new(
        authenticator: Arc<dyn AuthenticationProvider>,
        machine: impl Into<String>,
        remember_logons: bool,
    ) -> Self {
        Self {
            authenticator,
            machine: machine.into(),
            remember_logons,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Verifies `secret` for `user`. The secret is dropped before this
    /// returns.
    ///
    /// # Errors
    ///
    /// `InvalidLogon`, `TooManyInvalidLogons` or `LockedOut` per the
    /// rules above; `Auth` when the provider itself fails.
    pub fn authenticate(
        &self,
        user: &UserName,
        secret: SecretString,
        policy: &CredentialPolicy,
    ) -> Result<(), SudoError> {
        self.authenticate_at(user, secret, policy, Instant::now())
    }

    pub(crate) fn authenticate_at(
        &self,
        user: &UserName,
        secret: SecretString,
        policy: &CredentialPolicy,
        now: Instant,
    ) -> Result<(), SudoError> {
        let key = user.key().to_string();

        {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_default();
            entry.expire(now);
            if entry.locked_until.is_some() {
                tracing::info!(user = %user, "logon refused: locked out");
                return Err(SudoError::LockedOut);
            }
            if entry.cooldown_until.is_some() {
                tracing::info!(user = %user, "logon refused: invalid logon cool-down");
                return Err(SudoError::TooManyInvalidLogons);
            }
            if self.remember_logons && entry.valid_until.is_some() {
                tracing::debug!(user = %user, "cached logon");
                return Ok(());
            }
        }

        let domain = user.domain().unwrap_or(&self.machine);
        let verified = self
            .authenticator
            .verify_credentials(domain, user.name(), &secret);
        drop(secret);
        let verified = verified?;

        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_default();

        if verified {
            *entry = CacheEntry::default();
            if self.remember_logons {
                entry.valid_until = policy.logon_timeout.map(|t| now + t);
            }
            if entry.is_idle() {
                entries.remove(&key);
            }
            tracing::debug!(user = %user, "logon verified");
            return Ok(());
        }

        entry.invalid_logon_count += 1;
        let Some(limit) = policy.invalid_logons else {
            tracing::info!(user = %user, count = entry.invalid_logon_count, "invalid logon");
            return Err(SudoError::InvalidLogon);
        };
        if entry.invalid_logon_count < limit {
            tracing::info!(user = %user, count = entry.invalid_logon_count, limit, "invalid logon");
            return Err(SudoError::InvalidLogon);
        }

        entry.invalid_logon_count = 0;
        entry.times_exceeded += 1;
        entry.cooldown_until = policy.invalid_logon_timeout.map(|t| now + t);

        if let Some(max) = policy.times_exceeded_invalid_logons {
            if entry.times_exceeded >= max {
                entry.locked_until = Some(policy.lockout_timeout.map(|t| now + t));
                tracing::warn!(user = %user, times_exceeded = entry.times_exceeded, "user locked out");
                return Err(SudoError::LockedOut);
            }
        }
        tracing::warn!(user = %user, times_exceeded = entry.times_exceeded, "too many invalid logons");
        Err(SudoError::TooManyInvalidLogons)
    }

    /// Forgets everything recorded for `user`, lifting any lockout.
    pub fn reset(&self, user: &UserName) {
        if self.entries.lock().remove(user.key()).is_some() {
            tracing::info!(user = %user, "credentials cache entry reset");
        }
    }

    /// Whether `user` is currently locked out.
    #[must_use]
    pub fn is_locked_out(&self, user: &UserName) -> bool {
        let now = Instant::now();
        self.entries.lock().get_mut(user.key()).is_some_and(|e| {
            e.expire(now);
            e.locked_until.is_some()
        })
    }
}
