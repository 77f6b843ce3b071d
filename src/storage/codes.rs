// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification-code rows.
//!
//! One row per subject, keyed by the peppered subject hash. The raw code is
//! never stored; only the salted digest is. Issuing a new code replaces the
//! prior row in the same write transaction, so at most one code is ever
//! live for a subject.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::{Store, StoreResult};

/// subject key → serialized [`StoredCode`] (JSON bytes).
pub(crate) const VERIFICATION_CODES: TableDefinition<&str, &[u8]> =
    TableDefinition::new("verification_codes");

/// Persisted form of an issued verification code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCode {
    /// Peppered hash of the normalized subject email.
    pub subject_key: String,
    /// Base64url digest of `code_bytes ∥ salt`.
    pub code_hash: String,
    /// Base64url of the 16 random salt bytes.
    pub code_salt: String,
    /// Tracing token of the issuing attempt.
    pub correlation_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Repository for verification-code rows. Owned by the code vault.
pub struct CodeRepository<'a> {
    store: &'a Store,
}

impl<'a> CodeRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert a code row, superseding any prior row for the subject.
    pub fn upsert(&self, code: &StoredCode) -> StoreResult<()> {
        let json = serde_json::to_vec(code)?;
        let write_txn = self.store.db().begin_write()?;
        {
            let mut table = write_txn.open_table(VERIFICATION_CODES)?;
            table.insert(code.subject_key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, subject_key: &str) -> StoreResult<Option<StoredCode>> {
        let read_txn = self.store.db().begin_read()?;
        let table = read_txn.open_table(VERIFICATION_CODES)?;
        match table.get(subject_key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Remove the subject's row. Returns whether a row existed.
    pub fn delete(&self, subject_key: &str) -> StoreResult<bool> {
        let write_txn = self.store.db().begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(VERIFICATION_CODES)?;
            let existed = table.remove(subject_key)?.is_some();
            existed
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// Reap rows whose `expires_at` has passed. Returns the reaped count.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let write_txn = self.store.db().begin_write()?;
        let mut purged = 0u64;
        {
            let mut table = write_txn.open_table(VERIFICATION_CODES)?;

            let expired: Vec<String> = table
                .iter()?
                .filter_map(|entry| {
                    let (key, value) = entry.ok()?;
                    let code: StoredCode = serde_json::from_slice(value.value()).ok()?;
                    code.is_expired(now).then(|| key.value().to_string())
                })
                .collect();

            for key in &expired {
                table.remove(key.as_str())?;
                purged += 1;
            }
        }
        write_txn.commit()?;
        Ok(purged)
    }
}
