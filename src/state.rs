// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::directory::SubjectDirectory;
use crate::limiter::RateLimiter;
use crate::lock::LockManager;
use crate::notify::{NotificationDispatcher, NotificationProvider};
use crate::orchestrator::CleanupOrchestrator;
use crate::orphan::OrphanResolver;
use crate::pacing::ResponsePacer;
use crate::storage::Store;
use crate::subject::SubjectHasher;
use crate::vault::CodeVault;

/// Shared application state: the orchestrator plus the handles the health
/// endpoint and the background sweeper need.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: CleanupOrchestrator,
    pub store: Arc<Store>,
    pub limiter: RateLimiter,
    pub locks: LockManager,
    pub vault: CodeVault,
    pub provider_names: Vec<&'static str>,
    /// `"http"` against the internal directory API, `"memory"` in dev mode.
    pub directory_mode: &'static str,
}

impl AppState {
    pub fn new(
        config: &RuntimeConfig,
        store: Arc<Store>,
        directory: Arc<dyn SubjectDirectory>,
        providers: Vec<Arc<dyn NotificationProvider>>,
        clock: Arc<dyn Clock>,
        directory_mode: &'static str,
    ) -> Self {
        let hasher = SubjectHasher::new(config.subject_pepper.as_bytes().to_vec());
        let limiter = RateLimiter::new(store.clone(), clock.clone(), config.rate_limits);
        let locks = LockManager::new(store.clone(), clock.clone(), config.lock_ttl());
        let vault = CodeVault::new(store.clone(), clock.clone(), config.code_ttl());
        let resolver = OrphanResolver::new(directory.clone(), config.resolver_timeout());
        let dispatcher = NotificationDispatcher::new(providers, clock.clone());
        let pacer = ResponsePacer::new(clock.clone(), config.padding);
        let provider_names = dispatcher.provider_names();

        let orchestrator = CleanupOrchestrator::new(
            store.clone(),
            directory,
            clock,
            hasher,
            limiter.clone(),
            locks.clone(),
            vault.clone(),
            resolver,
            dispatcher,
            pacer,
            config.code_ttl_secs / 60,
        );

        Self {
            orchestrator,
            store,
            limiter,
            locks,
            vault,
            provider_names,
            directory_mode,
        }
    }
}
