// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded coordination store backed by redb (pure Rust, ACID).
//!
//! All cross-request state lives here; nothing is shared in process memory.
//! Every mutation is a single write transaction so concurrent workers (and
//! multiple service instances sharing the data directory) observe atomic
//! read-modify-write semantics.
//!
//! ## Table Layout
//!
//! - `verification_codes`: subject key → serialized code row
//! - `rate_buckets`: composite key (scope|second_be) → request count
//! - `lock_claims`: 64-bit subject key → serialized claim (owner, TTL)
//! - `cleanup_log`: correlation id → serialized audit entry

use std::path::Path;

use redb::Database;

pub mod buckets;
pub mod cleanup_log;
pub mod codes;
pub mod locks;

pub use buckets::{BucketRepository, ScopeCheck, ScopeUsage};
pub use cleanup_log::{CleanupLogEntry, CleanupLogRepository, CleanupStatus};
pub use codes::{CodeRepository, StoredCode};
pub use locks::LockRepository;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Store
// =============================================================================

/// Handle to the embedded coordination database.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(codes::VERIFICATION_CODES)?;
            let _ = write_txn.open_table(buckets::RATE_BUCKETS)?;
            let _ = write_txn.open_table(locks::LOCK_CLAIMS)?;
            let _ = write_txn.open_table(cleanup_log::CLEANUP_LOG)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    /// Verify the database accepts transactions.
    pub fn health_check(&self) -> StoreResult<()> {
        use redb::ReadableDatabase;
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(cleanup_log::CLEANUP_LOG)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Shared test helper: a fresh store in a temp directory.
    pub(crate) fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.redb")).unwrap();
        (store, dir)
    }

    #[test]
    fn open_precreates_tables_and_passes_health_check() {
        let (store, _dir) = temp_store();
        store.health_check().unwrap();
    }

    #[test]
    fn reopen_preserves_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.redb");
        {
            let store = Store::open(&path).unwrap();
            store.health_check().unwrap();
        }
        let store = Store::open(&path).unwrap();
        store.health_check().unwrap();
    }
}
