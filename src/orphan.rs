// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Orphan status resolution.
//!
//! An account is orphaned when it carries no organizational ownership
//! evidence. Both evidence lookups run concurrently and their joint
//! completion races a hard timeout.
//!
//! The load-bearing invariant: any failure or timeout yields `None`, not a
//! verdict. Unknown status must never read as "orphaned"; that mistake
//! would let the cleanup flow delete an account it knows nothing about.

use std::sync::Arc;
use std::time::Duration;

use crate::directory::SubjectDirectory;

/// Derived ownership verdict. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrphanStatus {
    /// `Some(true)` when either evidence query returned true.
    pub has_ownership_evidence: Option<bool>,
    /// Negation of the above; `None` when the lookup failed or timed out.
    pub is_orphaned: Option<bool>,
}

impl OrphanStatus {
    pub fn unknown() -> Self {
        Self {
            has_ownership_evidence: None,
            is_orphaned: None,
        }
    }

    pub fn from_evidence(has_evidence: bool) -> Self {
        Self {
            has_ownership_evidence: Some(has_evidence),
            is_orphaned: Some(!has_evidence),
        }
    }
}

/// Races the two ownership lookups against a joint timeout.
#[derive(Clone)]
pub struct OrphanResolver {
    directory: Arc<dyn SubjectDirectory>,
    timeout: Duration,
}

impl OrphanResolver {
    pub fn new(directory: Arc<dyn SubjectDirectory>, timeout: Duration) -> Self {
        Self { directory, timeout }
    }

    pub async fn resolve(&self, subject_id: &str) -> OrphanStatus {
        let lookups = async {
            tokio::try_join!(
                self.directory.owns_organization(subject_id),
                self.directory.administers_organization(subject_id),
            )
        };

        match tokio::time::timeout(self.timeout, lookups).await {
            Ok(Ok((owns, administers))) => OrphanStatus::from_evidence(owns || administers),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "ownership lookup failed; status unknown");
                OrphanStatus::unknown()
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "ownership lookup timed out; status unknown"
                );
                OrphanStatus::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryError, MemoryDirectory, SubjectDirectory, SubjectRecord};
    use async_trait::async_trait;
    use chrono::Utc;

    fn directory_with(id: &str) -> MemoryDirectory {
        let directory = MemoryDirectory::new();
        directory.insert(
            "subject@example.com",
            SubjectRecord {
                id: id.to_string(),
                verified_at: Some(Utc::now()),
                last_sign_in_at: None,
            },
        );
        directory
    }

    fn resolver(directory: Arc<dyn SubjectDirectory>) -> OrphanResolver {
        OrphanResolver::new(directory, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn no_evidence_means_orphaned() {
        let directory = Arc::new(directory_with("user-1"));
        let status = resolver(directory).resolve("user-1").await;

        assert_eq!(status.has_ownership_evidence, Some(false));
        assert_eq!(status.is_orphaned, Some(true));
    }

    #[tokio::test]
    async fn either_evidence_query_blocks_orphan_status() {
        let owner = Arc::new(directory_with("user-1"));
        owner.grant_ownership("user-1");
        let status = resolver(owner).resolve("user-1").await;
        assert_eq!(status.is_orphaned, Some(false));

        let admin = Arc::new(directory_with("user-2"));
        admin.grant_admin("user-2");
        let status = resolver(admin).resolve("user-2").await;
        assert_eq!(status.has_ownership_evidence, Some(true));
        assert_eq!(status.is_orphaned, Some(false));
    }

    #[tokio::test]
    async fn lookup_error_yields_unknown_never_orphaned() {
        let directory = Arc::new(directory_with("user-1"));
        directory.set_evidence_failure(true);

        let status = resolver(directory).resolve("user-1").await;
        assert_eq!(status.has_ownership_evidence, None);
        assert_eq!(status.is_orphaned, None);
    }

    /// Directory whose evidence queries hang past any reasonable timeout.
    struct StalledDirectory;

    #[async_trait]
    impl SubjectDirectory for StalledDirectory {
        async fn find_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<SubjectRecord>, DirectoryError> {
            Ok(None)
        }

        async fn owns_organization(&self, _subject_id: &str) -> Result<bool, DirectoryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(false)
        }

        async fn administers_organization(&self, _subject_id: &str) -> Result<bool, DirectoryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(false)
        }

        async fn delete_subject(&self, _subject_id: &str) -> Result<(), DirectoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn timeout_yields_unknown() {
        let resolver = OrphanResolver::new(Arc::new(StalledDirectory), Duration::from_millis(50));

        let status = resolver.resolve("user-1").await;
        assert_eq!(status.has_ownership_evidence, None);
        assert_eq!(status.is_orphaned, None);
    }
}
