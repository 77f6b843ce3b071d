// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Two-step cleanup endpoint.

use axum::{extract::State, Json};

use crate::{
    error::ApiError,
    models::{CleanupRequest, CleanupResponse},
    state::AppState,
};

use super::source::ClientSource;

/// Run one cleanup step, discriminated by the `step` tag.
///
/// The step executes in a spawned task: durable mutations (code issuance,
/// account deletion) run to completion even if the client disconnects;
/// only the response write is skippable.
#[utoipa::path(
    post,
    path = "/v1/cleanup",
    request_body = CleanupRequest,
    tag = "Cleanup",
    responses(
        (status = 200, description = "Step completed", body = CleanupResponse),
        (status = 400, description = "Malformed request"),
        (status = 401, description = "Invalid or expired verification code"),
        (status = 404, description = "No account for this address"),
        (status = 409, description = "Operation in flight, or account not orphaned"),
        (status = 429, description = "Rate limited"),
        (status = 500, description = "Transactional failure"),
        (status = 503, description = "Verification code delivery unavailable"),
    )
)]
pub async fn cleanup(
    ClientSource(source): ClientSource,
    State(state): State<AppState>,
    Json(request): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let orchestrator = state.orchestrator.clone();

    let task = tokio::spawn(async move {
        match request {
            CleanupRequest::RequestCode {
                email,
                correlation_id,
            } => {
                orchestrator
                    .request_code(&email, &source, correlation_id)
                    .await
            }
            CleanupRequest::ValidateAndCleanup {
                email,
                verification_code,
                correlation_id,
            } => {
                orchestrator
                    .validate_and_cleanup(&email, &verification_code, &source, correlation_id)
                    .await
            }
        }
    });

    match task.await {
        Ok(result) => result.map(Json),
        Err(join_error) => {
            tracing::error!(error = %join_error, "cleanup task aborted");
            Err(ApiError::transactional_failure())
        }
    }
}
