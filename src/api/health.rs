// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    /// Individual health checks and their results.
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Coordination database status.
    pub store: String,
    /// Directory collaborator mode (`http` or `memory`).
    pub directory: String,
    /// Configured mail providers, in failover order.
    pub providers: Vec<String>,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check endpoint handler.
///
/// Returns 200 if all checks pass, 503 if any check fails. A missing
/// provider chain is degraded: the status probe still works, but step 1
/// of the cleanup flow cannot deliver codes.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let store = match state.store.health_check() {
        Ok(()) => "ok".to_string(),
        Err(err) => {
            tracing::error!(error = %err, "store health check failed");
            "unavailable".to_string()
        }
    };

    let providers: Vec<String> = state
        .provider_names
        .iter()
        .map(|name| name.to_string())
        .collect();

    let all_ok = store == "ok" && !providers.is_empty();

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            store,
            directory: state.directory_mode.to_string(),
            providers,
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use readiness for that.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
///
/// Returns 200 only if all dependencies are available.
/// Use for Kubernetes readiness probes.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RuntimeConfig;
    use crate::directory::MemoryDirectory;
    use crate::notify::{CodeEmail, NotificationError, NotificationProvider};
    use crate::storage::Store;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct NoopProvider;

    #[async_trait]
    impl NotificationProvider for NoopProvider {
        fn name(&self) -> &'static str {
            "noop"
        }

        async fn send(&self, _email: &CodeEmail) -> Result<(), NotificationError> {
            Ok(())
        }
    }

    fn test_state(providers: Vec<Arc<dyn NotificationProvider>>) -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("test.redb")).unwrap());
        let state = AppState::new(
            &RuntimeConfig::default(),
            store,
            Arc::new(MemoryDirectory::new()),
            providers,
            Arc::new(ManualClock::default()),
            "memory",
        );
        (state, dir)
    }

    #[tokio::test]
    async fn healthy_when_store_and_providers_are_present() {
        let (state, _dir) = test_state(vec![Arc::new(NoopProvider)]);

        let (status, Json(response)) = health(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.status, "ok");
        assert_eq!(response.checks.store, "ok");
        assert_eq!(response.checks.providers, vec!["noop".to_string()]);
    }

    #[tokio::test]
    async fn degraded_without_any_mail_provider() {
        let (state, _dir) = test_state(Vec::new());

        let (status, Json(response)) = health(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status, "degraded");
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        let Json(response) = liveness().await;
        assert_eq!(response.status, "ok");
    }
}
