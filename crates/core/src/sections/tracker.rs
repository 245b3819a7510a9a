//! Single-flight refresh tracking.
//!
//! A [`SyncGuard`] is the handle proving a refresh for one (player, kind) key
//! is underway. At most one guard per key exists at a time; it is released
//! when dropped, which covers success, failure and panics in the refresh task.
//! The tracker does not lock reads, only who may start a refresh.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::Notify;

use super::kinds::SectionKind;
use super::types::{PlayerKey, SectionKey};

#[derive(Default)]
struct TrackerState {
    /// Outstanding handles, tagged with the generation that owns them.
    held: HashMap<SectionKey, u64>,
    next_generation: u64,
}

/// Registry of outstanding refresh handles.
#[derive(Default)]
pub struct SyncTracker {
    state: Mutex<TrackerState>,
    released: Notify,
}

impl SyncTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a handle for the key, or returns `None` when one is already
    /// held. All-or-nothing.
    pub fn try_acquire(self: &Arc<Self>, player_key: &PlayerKey, kind: SectionKind) -> Option<SyncGuard> {
        let key = SectionKey::new(player_key.clone(), kind);
        let mut state = self.state();
        if state.held.contains_key(&key) {
            debug!("Refresh for {} already in progress", key);
            return None;
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        state.held.insert(key.clone(), generation);
        Some(SyncGuard {
            tracker: Arc::clone(self),
            key,
            generation,
        })
    }

    /// Drops the handle for a key regardless of who holds it. A guard that
    /// outlives a forced release will not disturb a newer handle.
    pub fn release(&self, player_key: &PlayerKey, kind: SectionKind) {
        let key = SectionKey::new(player_key.clone(), kind);
        if self.state().held.remove(&key).is_some() {
            self.released.notify_waiters();
        }
    }

    fn release_generation(&self, key: &SectionKey, generation: u64) {
        let removed = {
            let mut state = self.state();
            match state.held.get(key) {
                Some(current) if *current == generation => state.held.remove(key).is_some(),
                _ => false,
            }
        };
        if removed {
            self.released.notify_waiters();
        }
    }

    pub fn is_pending(&self, player_key: &PlayerKey, kind: SectionKind) -> bool {
        self.state()
            .held
            .contains_key(&SectionKey::new(player_key.clone(), kind))
    }

    pub fn pending_count(&self) -> usize {
        self.state().held.len()
    }

    /// Waits until no refresh is outstanding for the key.
    pub async fn settled(&self, player_key: &PlayerKey, kind: SectionKind) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_pending(player_key, kind) {
                return;
            }
            notified.await;
        }
    }

    /// Waits until no refresh is outstanding at all.
    pub async fn all_settled(&self) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Handle for one in-flight refresh; releases its key on drop.
pub struct SyncGuard {
    tracker: Arc<SyncTracker>,
    key: SectionKey,
    generation: u64,
}

impl SyncGuard {
    pub fn key(&self) -> &SectionKey {
        &self.key
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.tracker.release_generation(&self.key, self.generation);
    }
}

impl std::fmt::Debug for SyncGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncGuard")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn player() -> PlayerKey {
        PlayerKey::new("p1").unwrap()
    }

    #[test]
    fn second_acquire_is_refused() {
        let tracker = SyncTracker::new();
        let guard = tracker.try_acquire(&player(), SectionKind::Roles);
        assert!(guard.is_some());
        assert!(tracker.try_acquire(&player(), SectionKind::Roles).is_none());
        assert!(tracker.try_acquire(&player(), SectionKind::Champions).is_some());
    }

    #[test]
    fn drop_releases_the_key() {
        let tracker = SyncTracker::new();
        {
            let _guard = tracker.try_acquire(&player(), SectionKind::Roles).unwrap();
            assert!(tracker.is_pending(&player(), SectionKind::Roles));
        }
        assert!(!tracker.is_pending(&player(), SectionKind::Roles));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn stale_guard_does_not_release_newer_handle() {
        let tracker = SyncTracker::new();
        let stale = tracker.try_acquire(&player(), SectionKind::Roles).unwrap();
        tracker.release(&player(), SectionKind::Roles);

        let fresh = tracker.try_acquire(&player(), SectionKind::Roles).unwrap();
        drop(stale);
        assert!(tracker.is_pending(&player(), SectionKind::Roles));
        drop(fresh);
        assert!(!tracker.is_pending(&player(), SectionKind::Roles));
    }

    #[test]
    fn panic_while_holding_releases() {
        let tracker = SyncTracker::new();
        let cloned = Arc::clone(&tracker);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.try_acquire(&PlayerKey::new("p1").unwrap(), SectionKind::Roles);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!tracker.is_pending(&player(), SectionKind::Roles));
    }

    #[tokio::test]
    async fn settled_waits_for_release() {
        let tracker = SyncTracker::new();
        let guard = tracker.try_acquire(&player(), SectionKind::Narrative).unwrap();

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.settled(&player(), SectionKind::Narrative).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("settled should resolve")
            .unwrap();
        tracker.all_settled().await;
    }
}
