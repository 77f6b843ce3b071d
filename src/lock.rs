// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-subject advisory locking.
//!
//! `try_acquire` is non-blocking: a held lock means another cleanup is in
//! flight for the same subject, and the caller must surface a conflict
//! rather than queue. The claim carries a TTL so a crashed worker cannot
//! wedge a subject forever, and an owner token so release can never drop a
//! successor's claim.

use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::storage::{LockRepository, Store, StoreResult};

/// Proof of a held lock; required for release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken {
    key: u64,
    owner: Uuid,
}

impl LockToken {
    pub fn key(&self) -> u64 {
        self.key
    }
}

/// Advisory lock manager over durable claim rows.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl LockManager {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self { store, clock, ttl }
    }

    /// Attempt to take the subject lock. `None` means contention.
    pub fn try_acquire(&self, key: u64) -> StoreResult<Option<LockToken>> {
        let owner = Uuid::new_v4();
        let claimed =
            LockRepository::new(&self.store).try_claim(key, owner, self.clock.now(), self.ttl)?;
        Ok(claimed.then_some(LockToken { key, owner }))
    }

    /// Release a held lock. Safe to call on every exit path; a claim that
    /// expired and was taken over is left alone.
    pub fn release(&self, token: LockToken) -> StoreResult<bool> {
        LockRepository::new(&self.store).release(token.key, token.owner)
    }

    /// Reap claims abandoned past their TTL.
    pub fn sweep(&self) -> StoreResult<u64> {
        LockRepository::new(&self.store).purge_expired(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::tests::temp_store;
    use std::time::Duration;

    fn manager() -> (LockManager, Arc<ManualClock>, tempfile::TempDir) {
        let (store, dir) = temp_store();
        let clock = Arc::new(ManualClock::default());
        let manager = LockManager::new(
            Arc::new(store),
            clock.clone(),
            chrono::Duration::seconds(120),
        );
        (manager, clock, dir)
    }

    #[test]
    fn only_one_acquisition_succeeds_per_subject() {
        let (manager, _clock, _dir) = manager();

        let token = manager.try_acquire(42).unwrap();
        assert!(token.is_some());
        assert!(manager.try_acquire(42).unwrap().is_none());
        // A different subject is unaffected.
        assert!(manager.try_acquire(43).unwrap().is_some());
    }

    #[test]
    fn release_then_reacquire() {
        let (manager, _clock, _dir) = manager();

        let token = manager.try_acquire(42).unwrap().unwrap();
        assert!(manager.release(token).unwrap());
        assert!(manager.try_acquire(42).unwrap().is_some());
    }

    #[test]
    fn expired_lock_is_taken_over() {
        let (manager, clock, _dir) = manager();

        let stale = manager.try_acquire(42).unwrap().unwrap();
        clock.advance(Duration::from_secs(121));

        let fresh = manager.try_acquire(42).unwrap();
        assert!(fresh.is_some());

        // The stale owner's late release must not free the new claim.
        assert!(!manager.release(stale).unwrap());
        assert!(manager.try_acquire(42).unwrap().is_none());
    }

    #[test]
    fn sweep_reaps_abandoned_claims() {
        let (manager, clock, _dir) = manager();

        manager.try_acquire(1).unwrap();
        manager.try_acquire(2).unwrap();
        clock.advance(Duration::from_secs(121));
        manager.try_acquire(3).unwrap();

        assert_eq!(manager.sweep().unwrap(), 2);
        assert!(manager.try_acquire(3).unwrap().is_none());
    }
}
