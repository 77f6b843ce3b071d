// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use relational_account_sweeper::{
    api::router,
    clock::{Clock, SystemClock},
    config::RuntimeConfig,
    directory::{HttpDirectory, MemoryDirectory, SubjectDirectory},
    notify::{BrevoProvider, NotificationProvider, ResendProvider},
    state::AppState,
    storage::Store,
};

#[tokio::main]
async fn main() {
    init_tracing();

    let config = RuntimeConfig::from_env();

    let store = Arc::new(
        Store::open(&config.data_dir.join("cleanup.redb")).expect("Failed to open the store"),
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (directory, directory_mode) = build_directory();
    let providers = build_providers();

    let state = AppState::new(
        &config,
        store,
        directory,
        providers,
        clock,
        directory_mode,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(sweeper(
        state.clone(),
        Duration::from_secs(config.sweep_interval_secs),
        shutdown.clone(),
    ));

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Failed to parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    tracing::info!(%addr, "account sweeper listening (docs at /docs)");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .expect("HTTP server failed");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json");
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_directory() -> (Arc<dyn SubjectDirectory>, &'static str) {
    if HttpDirectory::is_configured() {
        let directory =
            HttpDirectory::from_env().expect("Failed to build the directory client");
        (Arc::new(directory), "http")
    } else {
        tracing::warn!(
            "DIRECTORY_BASE_URL not set; using the in-memory directory (development mode)"
        );
        (Arc::new(MemoryDirectory::new()), "memory")
    }
}

fn build_providers() -> Vec<Arc<dyn NotificationProvider>> {
    let mut providers: Vec<Arc<dyn NotificationProvider>> = Vec::new();

    if BrevoProvider::is_configured() {
        match BrevoProvider::from_env() {
            Ok(provider) => providers.push(Arc::new(provider)),
            Err(err) => tracing::error!(error = %err, "brevo configuration rejected"),
        }
    }
    if ResendProvider::is_configured() {
        match ResendProvider::from_env() {
            Ok(provider) => providers.push(Arc::new(provider)),
            Err(err) => tracing::error!(error = %err, "resend configuration rejected"),
        }
    }

    if providers.is_empty() {
        tracing::warn!(
            "no mail providers configured; request-code will fail with delivery_unavailable"
        );
    }
    providers
}

/// Periodic garbage collection: expired codes, stale rate buckets,
/// abandoned lock claims.
async fn sweeper(state: AppState, interval: Duration, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        match state.vault.sweep() {
            Ok(0) => {}
            Ok(reaped) => tracing::debug!(reaped, "expired verification codes reaped"),
            Err(err) => tracing::error!(error = %err, "code sweep failed"),
        }
        match state.limiter.sweep() {
            Ok(0) => {}
            Ok(pruned) => tracing::debug!(pruned, "stale rate buckets pruned"),
            Err(err) => tracing::error!(error = %err, "bucket sweep failed"),
        }
        match state.locks.sweep() {
            Ok(0) => {}
            Ok(reaped) => tracing::debug!(reaped, "abandoned lock claims reaped"),
            Err(err) => tracing::error!(error = %err, "lock sweep failed"),
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
