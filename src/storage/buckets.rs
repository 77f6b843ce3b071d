// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sliding-window rate-limit buckets.
//!
//! One row per (scope, second). Admission sums the trailing window and
//! increments the current second, all inside a single write transaction:
//! concurrent callers for the same scope serialize on the commit, so the
//! window invariant holds without any in-process locking.
//!
//! Key format: `scope_key | second_be` for per-scope range scans.

use redb::{ReadableTable, TableDefinition};

use super::{Store, StoreResult};

/// composite key (scope|second_be) → request count.
pub(crate) const RATE_BUCKETS: TableDefinition<&[u8], u64> = TableDefinition::new("rate_buckets");

/// One admission scope to evaluate: key, limit, trailing window.
#[derive(Debug, Clone)]
pub struct ScopeCheck {
    pub scope_key: String,
    pub limit: u32,
    pub window_secs: u64,
}

/// Per-scope admission outcome.
#[derive(Debug, Clone)]
pub struct ScopeUsage {
    pub scope_key: String,
    pub allowed: bool,
    /// Requests observed in the window, including this one when admitted.
    pub current: u64,
    pub limit: u32,
    pub window_secs: u64,
    /// Seconds until the oldest in-window bucket exits the window. Zero
    /// when the scope admitted the request.
    pub retry_after_secs: u64,
}

fn bucket_key(scope_key: &str, second: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(scope_key.len() + 1 + 8);
    key.extend_from_slice(scope_key.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&second.to_be_bytes());
    key
}

/// Second component of a composite bucket key (last 8 bytes).
fn bucket_second(key: &[u8]) -> Option<u64> {
    if key.len() < 9 {
        return None;
    }
    let suffix: [u8; 8] = key[key.len() - 8..].try_into().ok()?;
    Some(u64::from_be_bytes(suffix))
}

/// Repository for rate-limit buckets. Owned by the rate limiter.
pub struct BucketRepository<'a> {
    store: &'a Store,
}

impl<'a> BucketRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Evaluate all scopes and, only if every one admits, increment each
    /// scope's current-second bucket. One write transaction end to end;
    /// denied requests consume no quota.
    pub fn admit(&self, now_unix: u64, checks: &[ScopeCheck]) -> StoreResult<Vec<ScopeUsage>> {
        let write_txn = self.store.db().begin_write()?;
        let mut usages = Vec::with_capacity(checks.len());
        {
            let mut table = write_txn.open_table(RATE_BUCKETS)?;

            for check in checks {
                let window_start = now_unix.saturating_sub(check.window_secs.saturating_sub(1));
                let start = bucket_key(&check.scope_key, window_start);
                let end = bucket_key(&check.scope_key, now_unix);

                let mut total = 0u64;
                let mut oldest_second = None;
                for entry in table.range(start.as_slice()..=end.as_slice())? {
                    let (key, count) = entry?;
                    total += count.value();
                    if oldest_second.is_none() {
                        oldest_second = bucket_second(key.value());
                    }
                }

                let allowed = total < u64::from(check.limit);
                let retry_after_secs = if allowed {
                    0
                } else {
                    oldest_second
                        .map(|s| (s + check.window_secs).saturating_sub(now_unix))
                        .unwrap_or(check.window_secs)
                        .max(1)
                };

                usages.push(ScopeUsage {
                    scope_key: check.scope_key.clone(),
                    allowed,
                    current: total,
                    limit: check.limit,
                    window_secs: check.window_secs,
                    retry_after_secs,
                });
            }

            if usages.iter().all(|usage| usage.allowed) {
                for usage in &mut usages {
                    let key = bucket_key(&usage.scope_key, now_unix);
                    let count = table
                        .get(key.as_slice())?
                        .map(|guard| guard.value())
                        .unwrap_or(0);
                    table.insert(key.as_slice(), count + 1)?;
                    usage.current += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(usages)
    }

    /// Garbage-collect buckets older than `max_age_secs`. Returns the
    /// number of rows removed.
    pub fn prune(&self, now_unix: u64, max_age_secs: u64) -> StoreResult<u64> {
        let cutoff = now_unix.saturating_sub(max_age_secs);
        let write_txn = self.store.db().begin_write()?;
        let mut pruned = 0u64;
        {
            let mut table = write_txn.open_table(RATE_BUCKETS)?;

            let stale: Vec<Vec<u8>> = table
                .iter()?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let key = key.value().to_vec();
                    (bucket_second(&key)? < cutoff).then_some(key)
                })
                .collect();

            for key in &stale {
                table.remove(key.as_slice())?;
                pruned += 1;
            }
        }
        write_txn.commit()?;
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::temp_store;

    fn check(scope: &str, limit: u32, window: u64) -> ScopeCheck {
        ScopeCheck {
            scope_key: scope.to_string(),
            limit,
            window_secs: window,
        }
    }

    #[test]
    fn admits_until_limit_then_denies_with_retry_after() {
        let (store, _dir) = temp_store();
        let repo = BucketRepository::new(&store);
        let now = 1_700_000_000u64;

        for i in 0..3 {
            let usages = repo.admit(now + i, &[check("ip:a", 3, 60)]).unwrap();
            assert!(usages[0].allowed, "request {i} should be admitted");
        }

        let denied = repo.admit(now + 3, &[check("ip:a", 3, 60)]).unwrap();
        assert!(!denied[0].allowed);
        assert_eq!(denied[0].current, 3);
        // Oldest bucket at `now` exits the window at now+60.
        assert_eq!(denied[0].retry_after_secs, 57);
    }

    #[test]
    fn admission_resumes_after_window_elapses() {
        let (store, _dir) = temp_store();
        let repo = BucketRepository::new(&store);
        let now = 1_700_000_000u64;

        for _ in 0..2 {
            repo.admit(now, &[check("ip:b", 2, 60)]).unwrap();
        }
        assert!(!repo.admit(now + 1, &[check("ip:b", 2, 60)]).unwrap()[0].allowed);

        let later = repo.admit(now + 60, &[check("ip:b", 2, 60)]).unwrap();
        assert!(later[0].allowed);
    }

    #[test]
    fn denial_in_one_scope_consumes_no_quota_anywhere() {
        let (store, _dir) = temp_store();
        let repo = BucketRepository::new(&store);
        let now = 1_700_000_000u64;

        // Exhaust the narrow scope.
        repo.admit(now, &[check("email:x", 1, 3600)]).unwrap();

        let scopes = [check("global", 1000, 60), check("email:x", 1, 3600)];
        let denied = repo.admit(now + 1, &scopes).unwrap();
        assert!(!denied[1].allowed);
        assert!(denied[0].allowed);

        // The global scope must not have been incremented by the denied call.
        let again = repo.admit(now + 2, &[check("global", 2, 60)]).unwrap();
        assert_eq!(again[0].current, 1, "only this admission counts");
    }

    #[test]
    fn retry_after_has_floor_of_one_second() {
        let (store, _dir) = temp_store();
        let repo = BucketRepository::new(&store);
        let now = 1_700_000_000u64;

        repo.admit(now, &[check("ip:c", 1, 60)]).unwrap();
        // At the last second of the window the retry-after still reports ≥1.
        let denied = repo.admit(now + 59, &[check("ip:c", 1, 60)]).unwrap();
        assert!(!denied[0].allowed);
        assert_eq!(denied[0].retry_after_secs, 1);
    }

    #[test]
    fn prune_removes_only_stale_buckets() {
        let (store, _dir) = temp_store();
        let repo = BucketRepository::new(&store);
        let now = 1_700_000_000u64;

        repo.admit(now - 7200, &[check("ip:old", 5, 60)]).unwrap();
        repo.admit(now, &[check("ip:new", 5, 60)]).unwrap();

        let pruned = repo.prune(now, 7200).unwrap();
        assert_eq!(pruned, 1);

        // Fresh bucket still counted.
        let usage = repo.admit(now, &[check("ip:new", 5, 60)]).unwrap();
        assert_eq!(usage[0].current, 2);
    }

    #[test]
    fn scopes_are_isolated() {
        let (store, _dir) = temp_store();
        let repo = BucketRepository::new(&store);
        let now = 1_700_000_000u64;

        repo.admit(now, &[check("ip:a", 1, 60)]).unwrap();
        let other = repo.admit(now, &[check("ip:b", 1, 60)]).unwrap();
        assert!(other[0].allowed);
    }
}
