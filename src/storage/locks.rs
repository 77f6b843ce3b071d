// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Advisory-lock claim rows.
//!
//! A claim row is the durable representation of a per-subject exclusive
//! lock: keyed by the 64-bit subject key, carrying the owner token and an
//! absolute expiry. Insert-if-absent-or-expired inside one write
//! transaction gives non-blocking mutual exclusion that holds across
//! service instances sharing the database.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Store, StoreResult};

/// 64-bit subject key → serialized [`LockClaim`] (JSON bytes).
pub(crate) const LOCK_CLAIMS: TableDefinition<u64, &[u8]> = TableDefinition::new("lock_claims");

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockClaim {
    owner: Uuid,
    expires_at: DateTime<Utc>,
}

/// Repository for lock claims. Owned by the lock manager.
pub struct LockRepository<'a> {
    store: &'a Store,
}

impl<'a> LockRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Claim the key for `owner` if it is free or the prior claim expired.
    ///
    /// Returns `true` when the claim was taken. Never blocks.
    pub fn try_claim(
        &self,
        key: u64,
        owner: Uuid,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> StoreResult<bool> {
        let write_txn = self.store.db().begin_write()?;
        let claimed = {
            let mut table = write_txn.open_table(LOCK_CLAIMS)?;

            let live = match table.get(key)? {
                Some(value) => {
                    let claim: LockClaim = serde_json::from_slice(value.value())?;
                    claim.expires_at > now
                }
                None => false,
            };

            if live {
                false
            } else {
                let claim = LockClaim {
                    owner,
                    expires_at: now + ttl,
                };
                let json = serde_json::to_vec(&claim)?;
                table.insert(key, json.as_slice())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(claimed)
    }

    /// Drop the claim if `owner` still holds it.
    ///
    /// Returns `true` when a row was removed. A foreign or missing claim is
    /// left untouched; the TTL may have let another worker take over.
    pub fn release(&self, key: u64, owner: Uuid) -> StoreResult<bool> {
        let write_txn = self.store.db().begin_write()?;
        let released = {
            let mut table = write_txn.open_table(LOCK_CLAIMS)?;

            let held = match table.get(key)? {
                Some(value) => {
                    let claim: LockClaim = serde_json::from_slice(value.value())?;
                    claim.owner == owner
                }
                None => false,
            };

            if held {
                table.remove(key)?;
                true
            } else {
                false
            }
        };
        write_txn.commit()?;
        Ok(released)
    }

    /// Reap expired claims abandoned by crashed workers.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let write_txn = self.store.db().begin_write()?;
        let mut purged = 0u64;
        {
            let mut table = write_txn.open_table(LOCK_CLAIMS)?;

            let dead: Vec<u64> = table
                .iter()?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    let claim: LockClaim = serde_json::from_slice(value.value()).ok()?;
                    (claim.expires_at <= now).then(|| key.value())
                })
                .collect();

            for key in dead {
                table.remove(key)?;
                purged += 1;
            }
        }
        write_txn.commit()?;
        Ok(purged)
    }
}
