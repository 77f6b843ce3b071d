// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        CheckStatusRequest, CheckStatusResponse, CleanupRequest, CleanupResponse,
        RegistrationStatus,
    },
    state::AppState,
};

pub mod cleanup;
pub mod health;
pub mod source;
pub mod status;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/check-status", post(status::check_status))
        .route("/cleanup", post(cleanup::cleanup))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        status::check_status,
        cleanup::cleanup,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            CheckStatusRequest,
            CheckStatusResponse,
            CleanupRequest,
            CleanupResponse,
            RegistrationStatus,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Status", description = "Account status probe"),
        (name = "Cleanup", description = "Two-step orphan-account cleanup"),
        (name = "Health", description = "Service health probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RuntimeConfig;
    use crate::directory::MemoryDirectory;
    use crate::storage::Store;
    use std::sync::Arc;

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("test.redb")).unwrap());
        let state = AppState::new(
            &RuntimeConfig::default(),
            store,
            Arc::new(MemoryDirectory::new()),
            Vec::new(),
            Arc::new(ManualClock::default()),
            "memory",
        );

        let app = router(state);
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }
}
