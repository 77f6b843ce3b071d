// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cleanup orchestration.
//!
//! Sequences every request through the same spine: admission, per-subject
//! lock, step work, audit log, unconditional unlock, response padding.
//! The lock is released on every exit path, success or failure, and every
//! outcome after input validation is padded to the constant-time target,
//! including rate-limit denials.

use std::sync::Arc;

use crate::clock::Clock;
use crate::directory::SubjectDirectory;
use crate::error::ApiError;
use crate::limiter::{Admission, RateLimiter};
use crate::lock::LockManager;
use crate::models::{CheckStatusResponse, CleanupResponse, RegistrationStatus};
use crate::notify::{CodeEmail, NotificationDispatcher};
use crate::orphan::OrphanResolver;
use crate::pacing::ResponsePacer;
use crate::storage::{CleanupLogRepository, CleanupStatus, Store, StoreError};
use crate::subject::{normalize_email, SubjectHasher, SubjectId};
use crate::vault::{CodeVault, VaultError};

/// Coordinates the status probe and the two cleanup steps.
#[derive(Clone)]
pub struct CleanupOrchestrator {
    store: Arc<Store>,
    directory: Arc<dyn SubjectDirectory>,
    clock: Arc<dyn Clock>,
    hasher: SubjectHasher,
    limiter: RateLimiter,
    locks: LockManager,
    vault: CodeVault,
    resolver: OrphanResolver,
    dispatcher: NotificationDispatcher,
    pacer: ResponsePacer,
    code_ttl_minutes: i64,
}

impl CleanupOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        directory: Arc<dyn SubjectDirectory>,
        clock: Arc<dyn Clock>,
        hasher: SubjectHasher,
        limiter: RateLimiter,
        locks: LockManager,
        vault: CodeVault,
        resolver: OrphanResolver,
        dispatcher: NotificationDispatcher,
        pacer: ResponsePacer,
        code_ttl_minutes: i64,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            hasher,
            limiter,
            locks,
            vault,
            resolver,
            dispatcher,
            pacer,
            code_ttl_minutes,
        }
    }

    // =========================================================================
    // Status probe
    // =========================================================================

    /// `POST /v1/check-status`: registration + orphan status for an address.
    ///
    /// Bounded by the resolver timeout; reports existence by design, so it
    /// is not padded. Admitted under the global and source scopes only.
    pub async fn check_status(
        &self,
        raw_email: &str,
        source: &str,
        attempt_id: Option<String>,
    ) -> Result<CheckStatusResponse, ApiError> {
        let email = normalize_email(raw_email)
            .ok_or_else(|| ApiError::validation("a valid email address is required"))?;
        let correlation_id = uuid::Uuid::new_v4().to_string();

        let admission = self
            .limiter
            .admit(Some(&self.hasher.source_hash(source)), None)
            .map_err(|err| storage_failure(&err, &correlation_id))?;
        if !admission.allowed {
            return Err(rate_limited(&admission));
        }

        let record = self
            .directory
            .find_by_email(&email)
            .await
            .map_err(|err| {
                tracing::warn!(%correlation_id, error = %err, "directory lookup failed");
                ApiError::transactional_failure()
            })?;

        let Some(record) = record else {
            return Ok(CheckStatusResponse {
                status: RegistrationStatus::NotRegistered,
                verified_at: None,
                last_sign_in_at: None,
                has_company_data: None,
                is_orphaned: None,
                attempt_id,
                correlation_id,
            });
        };

        let status = if record.verified_at.is_some() {
            RegistrationStatus::RegisteredVerified
        } else {
            RegistrationStatus::RegisteredUnverified
        };
        let orphan = self.resolver.resolve(&record.id).await;

        Ok(CheckStatusResponse {
            status,
            verified_at: record.verified_at,
            last_sign_in_at: record.last_sign_in_at,
            has_company_data: orphan.has_ownership_evidence,
            is_orphaned: orphan.is_orphaned,
            attempt_id,
            correlation_id,
        })
    }

    // =========================================================================
    // Step 1: request-code
    // =========================================================================

    /// `step: request-code`: verify the account is orphaned and email a code.
    pub async fn request_code(
        &self,
        raw_email: &str,
        source: &str,
        correlation_id: Option<String>,
    ) -> Result<CleanupResponse, ApiError> {
        let started = self.clock.now();

        // Malformed input never probed the subject; exempt from padding.
        let email = normalize_email(raw_email)
            .ok_or_else(|| ApiError::validation("a valid email address is required"))?;
        let correlation_id = correlation_or_fresh(correlation_id);
        let subject = self.hasher.subject_id(&email);

        let result = self
            .guarded(source, &subject, &correlation_id, |orchestrator| {
                let email = email.clone();
                let correlation_id = correlation_id.clone();
                async move {
                    orchestrator
                        .locked_request_code(&email, subject, &correlation_id)
                        .await
                }
            })
            .await;

        self.pacer.pad(started).await;

        result.map(|()| CleanupResponse {
            message: "A verification code has been sent to this address.".to_string(),
            correlation_id,
        })
    }

    async fn locked_request_code(
        &self,
        email: &str,
        subject: SubjectId,
        correlation_id: &str,
    ) -> Result<(), ApiError> {
        let record = self
            .directory
            .find_by_email(email)
            .await
            .map_err(|err| {
                tracing::warn!(correlation_id, error = %err, "directory lookup failed");
                ApiError::transactional_failure()
            })?
            .ok_or_else(ApiError::subject_not_found)?;

        self.require_orphaned(&record.id, correlation_id).await?;

        let raw_code = self
            .vault
            .issue(&subject.storage_key(), correlation_id)
            .map_err(|err| vault_failure(&err, correlation_id))?;

        let message = CodeEmail {
            to: email.to_string(),
            code: raw_code,
            correlation_id: correlation_id.to_string(),
            ttl_minutes: self.code_ttl_minutes,
        };
        if self.dispatcher.send(&message).await.is_err() {
            self.record_log(
                correlation_id,
                &subject,
                CleanupStatus::Failed,
                Some("delivery_unavailable"),
            );
            return Err(ApiError::delivery_unavailable());
        }

        self.record_log(correlation_id, &subject, CleanupStatus::Pending, None);
        Ok(())
    }

    // =========================================================================
    // Step 2: validate-and-cleanup
    // =========================================================================

    /// `step: validate-and-cleanup`: validate the code and delete the account.
    pub async fn validate_and_cleanup(
        &self,
        raw_email: &str,
        submitted_code: &str,
        source: &str,
        correlation_id: Option<String>,
    ) -> Result<CleanupResponse, ApiError> {
        let started = self.clock.now();

        let email = normalize_email(raw_email)
            .ok_or_else(|| ApiError::validation("a valid email address is required"))?;
        if submitted_code.trim().is_empty() {
            return Err(ApiError::validation("verificationCode is required"));
        }
        let correlation_id = correlation_or_fresh(correlation_id);
        let subject = self.hasher.subject_id(&email);

        let result = self
            .guarded(source, &subject, &correlation_id, |orchestrator| {
                let email = email.clone();
                let code = submitted_code.to_string();
                let correlation_id = correlation_id.clone();
                async move {
                    orchestrator
                        .locked_validate_and_cleanup(&email, &code, subject, &correlation_id)
                        .await
                }
            })
            .await;

        self.pacer.pad(started).await;

        result.map(|()| CleanupResponse {
            message: "The account has been deleted.".to_string(),
            correlation_id,
        })
    }

    async fn locked_validate_and_cleanup(
        &self,
        email: &str,
        submitted_code: &str,
        subject: SubjectId,
        correlation_id: &str,
    ) -> Result<(), ApiError> {
        let record = self
            .directory
            .find_by_email(email)
            .await
            .map_err(|err| {
                tracing::warn!(correlation_id, error = %err, "directory lookup failed");
                ApiError::transactional_failure()
            })?
            .ok_or_else(ApiError::subject_not_found)?;

        let valid = self
            .vault
            .validate(&subject.storage_key(), submitted_code)
            .map_err(|err| vault_failure(&err, correlation_id))?;
        if !valid {
            return Err(ApiError::code_expired_or_invalid());
        }

        // Re-check: the account may have gained ownership between steps.
        if let Err(err) = self.require_orphaned(&record.id, correlation_id).await {
            self.record_log(
                correlation_id,
                &subject,
                CleanupStatus::Failed,
                Some(err.code.as_str()),
            );
            return Err(err);
        }

        if let Err(err) = self.directory.delete_subject(&record.id).await {
            tracing::error!(correlation_id, error = %err, "account deletion failed");
            self.record_log(
                correlation_id,
                &subject,
                CleanupStatus::Failed,
                Some("transactional_failure"),
            );
            return Err(ApiError::transactional_failure());
        }

        // The account is gone; a failed revoke only leaves a row the
        // expiry sweep will reap.
        if let Err(err) = self.vault.revoke(&subject.storage_key()) {
            tracing::warn!(correlation_id, error = %err, "code revocation failed after deletion");
        }

        self.record_log(correlation_id, &subject, CleanupStatus::Completed, None);
        tracing::info!(correlation_id, "orphaned account cleaned up");
        Ok(())
    }

    // =========================================================================
    // Shared spine
    // =========================================================================

    /// Admission check plus per-subject lock around `work`, with the lock
    /// released on every exit path.
    async fn guarded<'a, F, Fut>(
        &'a self,
        source: &str,
        subject: &SubjectId,
        correlation_id: &str,
        work: F,
    ) -> Result<(), ApiError>
    where
        F: FnOnce(&'a Self) -> Fut,
        Fut: std::future::Future<Output = Result<(), ApiError>>,
    {
        let admission = self
            .limiter
            .admit(
                Some(&self.hasher.source_hash(source)),
                Some(&subject.storage_key()),
            )
            .map_err(|err| storage_failure(&err, correlation_id))?;
        if !admission.allowed {
            return Err(rate_limited(&admission));
        }

        let token = self
            .locks
            .try_acquire(subject.lock_key())
            .map_err(|err| storage_failure(&err, correlation_id))?
            .ok_or_else(|| {
                tracing::debug!(correlation_id, "subject lock contended");
                ApiError::lock_conflict()
            })?;

        let result = work(self).await;

        // Unconditional release; a failure here must not mask the outcome.
        match self.locks.release(token) {
            Ok(_) => {}
            Err(err) => {
                tracing::error!(correlation_id, error = %err, "lock release failed");
            }
        }

        result
    }

    fn require_orphaned_status(status: Option<bool>) -> Result<(), ApiError> {
        match status {
            Some(true) => Ok(()),
            Some(false) => Err(ApiError::not_orphaned()),
            // Unknown is not orphaned. Refuse rather than guess.
            None => Err(ApiError::transactional_failure()),
        }
    }

    async fn require_orphaned(
        &self,
        subject_directory_id: &str,
        correlation_id: &str,
    ) -> Result<(), ApiError> {
        let orphan = self.resolver.resolve(subject_directory_id).await;
        if orphan.is_orphaned.is_none() {
            tracing::warn!(correlation_id, "orphan status unknown; refusing cleanup");
        }
        Self::require_orphaned_status(orphan.is_orphaned)
    }

    /// Audit-trail write. Best-effort by the time it runs: failures are
    /// logged, not surfaced over an already-performed durable action.
    fn record_log(
        &self,
        correlation_id: &str,
        subject: &SubjectId,
        status: CleanupStatus,
        error_code: Option<&str>,
    ) {
        let result = CleanupLogRepository::new(&self.store).record(
            correlation_id,
            &subject.storage_key(),
            status,
            error_code,
            self.clock.now(),
        );
        if let Err(err) = result {
            tracing::error!(correlation_id, error = %err, "cleanup log write failed");
        }
    }
}

fn correlation_or_fresh(supplied: Option<String>) -> String {
    supplied
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn rate_limited(admission: &Admission) -> ApiError {
    ApiError::rate_limited(
        admission.limit,
        admission.remaining,
        admission.retry_after_secs,
    )
}

fn storage_failure(err: &StoreError, correlation_id: &str) -> ApiError {
    tracing::error!(correlation_id, error = %err, "storage operation failed");
    ApiError::transactional_failure()
}

fn vault_failure(err: &VaultError, correlation_id: &str) -> ApiError {
    tracing::error!(correlation_id, error = %err, "code vault operation failed");
    ApiError::transactional_failure()
}
