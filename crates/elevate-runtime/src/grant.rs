//! Privilege grant manager.
//!
//! Grants are reference counted per `(user, group)` pair. The first
//! lease adds the user to the privileges group; the membership is
//! removed only when the last lease is released, and only if this
//! manager added it. A membership that predates the first lease is
//! never touched.
//!
//! ```text
//!  acquire ─► slot lock ─► holders == 0 ? AddRemoveUser(Add) : reuse
//!                                  │
//!                          holders += 1 ─► GrantLease
//!
//!  release ─► slot lock ─► holders -= 1 ─► holders == 0 && owned ? Remove
//! ```
//!
//! Each slot is a `tokio::sync::Mutex`, so directory calls for one pair
//! are serialized while other pairs proceed. Directory calls are
//! blocking and run on the blocking pool.
//!
//! Deferred releases are recorded until their timer fires.
//! [`GrantManager::revoke_scheduled`] runs every recorded release at
//! once; hosts call it before the runtime stops. A process that dies
//! inside the delay leaves the membership in place until an explicit
//! [`GrantManager::unsudo`].

use elevate_auth::{DirectoryError, Membership, MembershipOp, SudoError};
use elevate_types::{GroupName, UserName};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Identity of a grant: who is in which privileges group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantKey {
    pub user: UserName,
    pub group: GroupName,
}

impl GrantKey {
    pub fn new(user: UserName, group: GroupName) -> Self {
        Self { user, group }
    }
}

impl std::fmt::Display for GrantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in {}", self.user, self.group)
    }
}

#[derive(Debug, Default)]
struct GrantSlot {
    /// Live leases.
    holders: usize,
    /// This manager added the membership and must remove it.
    owned: bool,
    /// An explicit unsudo arrived while leases were live.
    pending_unsudo: bool,
}

/// Result of [`GrantManager::unsudo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsudoOutcome {
    Removed,
    /// The user was not in the group.
    NotMember,
    /// Live leases exist; the removal happens with the last release.
    Deferred,
}

/// Serializes privileges-group membership changes per `(user, group)`.
pub struct GrantManager {
    membership: Membership,
    slots: Mutex<HashMap<GrantKey, Arc<tokio::sync::Mutex<GrantSlot>>>>,
    /// Deferred releases whose timer has not fired, by schedule id.
    scheduled: Mutex<HashMap<u64, GrantKey>>,
    next_schedule: AtomicU64,
}

impl std::fmt::Debug for GrantManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantManager")
            .field("membership", &self.membership)
            .field("slots", &self.slots.lock().len())
            .field("scheduled", &self.scheduled.lock().len())
            .finish()
    }
}

impl GrantManager {
    pub fn new(membership: Membership) -> Arc<Self> {
        Arc::new(Self {
            membership,
            slots: Mutex::new(HashMap::new()),
            scheduled: Mutex::new(HashMap::new()),
            next_schedule: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// Number of pairs with live leases or a pending change.
    #[must_use]
    pub fn active_grants(&self) -> usize {
        self.slots.lock().len()
    }

    /// Grants with a deferred release still pending.
    #[must_use]
    pub fn scheduled_revokes(&self) -> Vec<GrantKey> {
        let mut keys: Vec<_> = self.scheduled.lock().values().cloned().collect();
        keys.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        keys
    }

    /// Runs every pending deferred release now.
    ///
    /// Returns how many releases ran. Their timers find nothing left to
    /// do when they fire.
    pub async fn revoke_scheduled(self: &Arc<Self>) -> usize {
        let pending: Vec<GrantKey> = self.scheduled.lock().drain().map(|(_, key)| key).collect();
        let count = pending.len();
        for key in pending {
            tracing::info!(grant = %key, "running scheduled revoke early");
            Arc::clone(self).release(key).await;
        }
        count
    }

    fn schedule(&self, key: GrantKey) -> u64 {
        let id = self.next_schedule.fetch_add(1, Ordering::Relaxed);
        self.scheduled.lock().insert(id, key);
        id
    }

    /// Claims a scheduled release; `None` if it already ran.
    fn take_scheduled(&self, id: u64) -> Option<GrantKey> {
        self.scheduled.lock().remove(&id)
    }

    /// Takes a lease on `user`'s membership of `group`.
    ///
    /// # Errors
    ///
    /// Lookup and directory errors from the add. Nothing was granted
    /// and no revoke is pending when an error is returned.
    pub async fn acquire(
        self: &Arc<Self>,
        user: &UserName,
        group: &GroupName,
    ) -> Result<GrantLease, SudoError> {
        let key = GrantKey::new(user.clone(), group.clone());
        let slot = self.slot(&key);
        let mut state = slot.lock().await;

        if state.holders == 0 {
            match self.change(&key, MembershipOp::Add).await {
                Ok(was_member) => state.owned = !was_member,
                Err(e) => {
                    drop(state);
                    self.prune(&key, slot);
                    return Err(e);
                }
            }
        }
        state.holders += 1;
        let temporary = state.owned;
        tracing::debug!(grant = %key, holders = state.holders, temporary, "grant acquired");
        drop(state);

        Ok(GrantLease {
            manager: Arc::clone(self),
            key,
            temporary,
            released: false,
        })
    }

    /// Removes `user` from `group` on request.
    ///
    /// Deferred to the last release while leases are live.
    ///
    /// # Errors
    ///
    /// Lookup and directory errors from the removal.
    pub async fn unsudo(
        self: &Arc<Self>,
        user: &UserName,
        group: &GroupName,
    ) -> Result<UnsudoOutcome, SudoError> {
        let key = GrantKey::new(user.clone(), group.clone());
        let slot = self.slot(&key);
        let mut state = slot.lock().await;

        if state.holders > 0 {
            state.pending_unsudo = true;
            tracing::info!(grant = %key, holders = state.holders, "unsudo deferred until last release");
            return Ok(UnsudoOutcome::Deferred);
        }

        let result = self.change(&key, MembershipOp::Remove).await;
        if result.is_ok() {
            state.owned = false;
            state.pending_unsudo = false;
        }
        drop(state);
        self.prune(&key, slot);

        Ok(if result? {
            UnsudoOutcome::Removed
        } else {
            UnsudoOutcome::NotMember
        })
    }

    async fn release(self: Arc<Self>, key: GrantKey) {
        let slot = self.slot(&key);
        let mut state = slot.lock().await;
        state.holders = state.holders.saturating_sub(1);

        if state.holders == 0 && (state.owned || state.pending_unsudo) {
            match self.change(&key, MembershipOp::Remove).await {
                Ok(_) => tracing::debug!(grant = %key, "grant revoked"),
                Err(e) => {
                    tracing::warn!(grant = %key, error = %e, "failed to revoke grant");
                }
            }
            state.owned = false;
            state.pending_unsudo = false;
        } else {
            tracing::debug!(grant = %key, holders = state.holders, "grant released");
        }
        drop(state);
        self.prune(&key, slot);
    }

    fn slot(&self, key: &GrantKey) -> Arc<tokio::sync::Mutex<GrantSlot>> {
        Arc::clone(self.slots.lock().entry(key.clone()).or_default())
    }

    /// Drops an idle slot nobody else is holding.
    fn prune(&self, key: &GrantKey, slot: Arc<tokio::sync::Mutex<GrantSlot>>) {
        let mut slots = self.slots.lock();
        // One reference in the map, one here: no other task can reach it.
        if Arc::strong_count(&slot) != 2 {
            return;
        }
        let idle = slot
            .try_lock()
            .is_ok_and(|s| s.holders == 0 && !s.owned && !s.pending_unsudo);
        if idle {
            slots.remove(key);
        }
    }

    async fn change(&self, key: &GrantKey, op: MembershipOp) -> Result<bool, SudoError> {
        let membership = self.membership.clone();
        let user = key.user.clone();
        let group = key.group.clone();
        tokio::task::spawn_blocking(move || membership.add_remove(&user, &group, op))
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("membership task failed: {e}")))?
    }
}

/// A live claim on a privileges-group membership.
///
/// Release it with [`release`](Self::release) or
/// [`release_after`](Self::release_after). Dropping an unreleased lease
/// inside a tokio runtime schedules an immediate release.
#[must_use = "a dropped lease is released immediately"]
pub struct GrantLease {
    manager: Arc<GrantManager>,
    key: GrantKey,
    temporary: bool,
    released: bool,
}

impl std::fmt::Debug for GrantLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantLease")
            .field("key", &self.key)
            .field("temporary", &self.temporary)
            .finish_non_exhaustive()
    }
}

impl GrantLease {
    #[must_use]
    pub fn key(&self) -> &GrantKey {
        &self.key
    }

    /// Whether the membership will be revoked when the last lease goes.
    ///
    /// `false` when the user was a member before any lease existed.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Releases now, revoking if this was the last lease.
    pub async fn release(mut self) {
        self.released = true;
        Arc::clone(&self.manager).release(self.key.clone()).await;
    }

    /// Releases after `delay` on a background task.
    ///
    /// The release is recorded with the manager until it runs, so
    /// [`GrantManager::revoke_scheduled`] can run it early.
    pub fn release_after(mut self, delay: Duration) -> JoinHandle<()> {
        self.released = true;
        let manager = Arc::clone(&self.manager);
        let id = manager.schedule(self.key.clone());
        tracing::debug!(grant = %self.key, delay_secs = delay.as_secs(), "revoke scheduled");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(key) = manager.take_scheduled(id) {
                manager.release(key).await;
            }
        })
    }
}

impl Drop for GrantLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let manager = Arc::clone(&self.manager);
                let key = self.key.clone();
                handle.spawn(manager.release(key));
            }
            Err(_) => {
                tracing::warn!(grant = %self.key, "lease dropped outside a runtime, grant left in place");
            }
        }
    }
}
