// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account status probe.

use axum::{extract::State, Json};

use crate::{
    error::ApiError,
    models::{CheckStatusRequest, CheckStatusResponse},
    state::AppState,
};

use super::source::ClientSource;

/// Report registration and orphan status for an address.
///
/// Latency is bounded by the ownership-lookup timeout; a degraded lookup
/// yields `null` ownership fields, never a guess.
#[utoipa::path(
    post,
    path = "/v1/check-status",
    request_body = CheckStatusRequest,
    tag = "Status",
    responses(
        (status = 200, description = "Status report", body = CheckStatusResponse),
        (status = 400, description = "Malformed request"),
        (status = 429, description = "Rate limited"),
    )
)]
pub async fn check_status(
    ClientSource(source): ClientSource,
    State(state): State<AppState>,
    Json(request): Json<CheckStatusRequest>,
) -> Result<Json<CheckStatusResponse>, ApiError> {
    let response = state
        .orchestrator
        .check_status(&request.email, &source, request.attempt_id)
        .await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RuntimeConfig;
    use crate::directory::{MemoryDirectory, SubjectRecord};
    use crate::models::RegistrationStatus;
    use crate::storage::Store;
    use axum::http::StatusCode;
    use chrono::Utc;
    use std::sync::Arc;

    fn test_state(directory: Arc<MemoryDirectory>) -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("test.redb")).unwrap());
        let state = AppState::new(
            &RuntimeConfig::default(),
            store,
            directory,
            Vec::new(),
            Arc::new(ManualClock::default()),
            "memory",
        );
        (state, dir)
    }

    #[tokio::test]
    async fn unregistered_address_reports_not_registered() {
        let directory = Arc::new(MemoryDirectory::new());
        let (state, _dir) = test_state(directory);

        let Json(response) = check_status(
            ClientSource("203.0.113.9".to_string()),
            State(state),
            Json(CheckStatusRequest {
                email: "a@x.com".to_string(),
                attempt_id: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.status, RegistrationStatus::NotRegistered);
        assert_eq!(response.is_orphaned, None);
    }

    #[tokio::test]
    async fn verified_owner_reports_not_orphaned() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.insert(
            "owner@example.com",
            SubjectRecord {
                id: "user-1".to_string(),
                verified_at: Some(Utc::now()),
                last_sign_in_at: None,
            },
        );
        directory.grant_ownership("user-1");
        let (state, _dir) = test_state(directory);

        let Json(response) = check_status(
            ClientSource("203.0.113.9".to_string()),
            State(state),
            Json(CheckStatusRequest {
                email: "owner@example.com".to_string(),
                attempt_id: Some("attempt-1".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.status, RegistrationStatus::RegisteredVerified);
        assert_eq!(response.has_company_data, Some(true));
        assert_eq!(response.is_orphaned, Some(false));
        assert_eq!(response.attempt_id.as_deref(), Some("attempt-1"));
    }

    #[tokio::test]
    async fn malformed_email_is_a_bad_request() {
        let directory = Arc::new(MemoryDirectory::new());
        let (state, _dir) = test_state(directory);

        let err = check_status(
            ClientSource("203.0.113.9".to_string()),
            State(state),
            Json(CheckStatusRequest {
                email: "not an email".to_string(),
                attempt_id: None,
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
