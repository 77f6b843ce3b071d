// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cleanup audit trail.
//!
//! One entry per cleanup attempt, keyed by correlation id. Only the
//! orchestrator writes here, and only it transitions an entry to a
//! terminal status. Entries reference subjects by their peppered hash;
//! no raw addresses in the trail.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::{Store, StoreResult};

/// correlation id → serialized [`CleanupLogEntry`] (JSON bytes).
pub(crate) const CLEANUP_LOG: TableDefinition<&str, &[u8]> = TableDefinition::new("cleanup_log");

/// Attempt status, transitioned only by the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Pending,
    Completed,
    Failed,
}

/// One cleanup attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanupLogEntry {
    pub correlation_id: String,
    /// Peppered hash of the subject email.
    pub subject_key: String,
    pub status: CleanupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository for the cleanup audit trail. Owned by the orchestrator.
pub struct CleanupLogRepository<'a> {
    store: &'a Store,
}

impl<'a> CleanupLogRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Record a status for the attempt identified by `correlation_id`.
    ///
    /// An existing entry is transitioned in place (`updated_at` bumped);
    /// otherwise a new entry is appended.
    pub fn record(
        &self,
        correlation_id: &str,
        subject_key: &str,
        status: CleanupStatus,
        error_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<CleanupLogEntry> {
        let write_txn = self.store.db().begin_write()?;
        let entry = {
            let mut table = write_txn.open_table(CLEANUP_LOG)?;

            let existing: Option<CleanupLogEntry> = match table.get(correlation_id)? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            let entry = match existing {
                Some(mut entry) => {
                    entry.status = status;
                    entry.error_code = error_code.map(str::to_string);
                    entry.updated_at = now;
                    entry
                }
                None => CleanupLogEntry {
                    correlation_id: correlation_id.to_string(),
                    subject_key: subject_key.to_string(),
                    status,
                    error_code: error_code.map(str::to_string),
                    created_at: now,
                    updated_at: now,
                },
            };

            let json = serde_json::to_vec(&entry)?;
            table.insert(correlation_id, json.as_slice())?;
            entry
        };
        write_txn.commit()?;
        Ok(entry)
    }

    pub fn get(&self, correlation_id: &str) -> StoreResult<Option<CleanupLogEntry>> {
        let read_txn = self.store.db().begin_read()?;
        let table = read_txn.open_table(CLEANUP_LOG)?;
        match table.get(correlation_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}
