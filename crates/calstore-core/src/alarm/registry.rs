//! In-process bookkeeping of claims that still need lease refreshes.
//!
//! A [`RefreshRegistry`] is shared by one acquisition batch and its refresher:
//! acquisition inserts, [`AcquiredLock`] release removes, the refresher
//! snapshots. The refresher stops once the registry runs empty.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use uuid::Uuid;

use super::types::AlarmKey;

/// Thread-safe map of claimed trigger keys to their claim tokens.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct RefreshRegistry {
    claims: Arc<Mutex<HashMap<AlarmKey, Uuid>>>,
}

impl RefreshRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the guard cannot leave the map half-updated,
    // so a poisoned lock is still usable.
    fn guard(&self) -> MutexGuard<'_, HashMap<AlarmKey, Uuid>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, key: AlarmKey, claim: Uuid) {
        self.guard().insert(key, claim);
    }

    pub fn remove(&self, key: &AlarmKey) -> Option<Uuid> {
        self.guard().remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Copy of all entries, sorted by key so refresh statements are stable.
    pub fn snapshot(&self) -> Vec<(AlarmKey, Uuid)> {
        let mut entries: Vec<_> = self.guard().iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_unstable_by_key(|(key, _)| *key);
        entries
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Handle releasing one acquired claim.
///
/// The release action runs at most once: on [`AcquiredLock::release`] or on
/// drop, whichever comes first.
pub struct AcquiredLock {
    release: Option<ReleaseFn>,
}

impl AcquiredLock {
    /// Lock whose release does nothing (dry runs).
    #[must_use]
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Lock that runs `release` when let go.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Lock that removes `key` from `registry` when let go.
    #[must_use]
    pub fn registered(registry: RefreshRegistry, key: AlarmKey) -> Self {
        Self::new(move || {
            if registry.remove(&key).is_some() {
                tracing::debug!(
                    context_id = key.context_id,
                    account_id = key.account_id,
                    alarm_id = key.alarm_id,
                    "Released alarm trigger claim"
                );
            }
        })
    }

    pub const fn is_held(&self) -> bool {
        self.release.is_some()
    }

    pub fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for AcquiredLock {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for AcquiredLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquiredLock")
            .field("held", &self.is_held())
            .finish()
    }
}
