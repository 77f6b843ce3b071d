// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Multi-scope sliding-window admission control.
//!
//! Every request is checked against up to three independent scopes:
//!
//! 1. **Global**: one budget for the whole deployment
//! 2. **Source**: per client address, the abuse throttle
//! 3. **Subject**: per target email, the per-victim throttle
//!
//! All scopes must admit; the increments happen atomically only when they
//! do. The failing scope with the largest retry-after determines what the
//! client is told.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::RateLimitSettings;
use crate::storage::{BucketRepository, ScopeCheck, ScopeUsage, Store, StoreResult};

/// Aggregated admission outcome across all evaluated scopes.
#[derive(Debug, Clone)]
pub struct Admission {
    pub allowed: bool,
    /// Limit of the governing scope (tightest failing scope when denied,
    /// least-headroom scope when admitted).
    pub limit: u32,
    /// Requests left in the governing scope's window.
    pub remaining: u64,
    pub window_secs: u64,
    /// Seconds the client should wait before retrying. Zero when admitted.
    pub retry_after_secs: u64,
}

impl Admission {
    fn from_usages(usages: &[ScopeUsage]) -> Self {
        let allowed = usages.iter().all(|usage| usage.allowed);

        let governing = if allowed {
            // Least headroom left after this admission.
            usages
                .iter()
                .min_by_key(|usage| u64::from(usage.limit).saturating_sub(usage.current))
        } else {
            // Tightest failing scope: the one forcing the longest wait.
            usages
                .iter()
                .filter(|usage| !usage.allowed)
                .max_by_key(|usage| usage.retry_after_secs)
        };

        match governing {
            Some(scope) => Self {
                allowed,
                limit: scope.limit,
                remaining: u64::from(scope.limit).saturating_sub(scope.current),
                window_secs: scope.window_secs,
                retry_after_secs: if allowed { 0 } else { scope.retry_after_secs },
            },
            // No scopes evaluated; treat as admitted with no budget info.
            None => Self {
                allowed: true,
                limit: 0,
                remaining: 0,
                window_secs: 0,
                retry_after_secs: 0,
            },
        }
    }
}

/// Sliding-window rate limiter over durable buckets.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, settings: RateLimitSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Admit or deny one request.
    ///
    /// `source_hash` and `subject_hash` are pre-hashed scope fragments; a
    /// `None` skips that scope (the status probe passes no subject scope).
    pub fn admit(
        &self,
        source_hash: Option<&str>,
        subject_hash: Option<&str>,
    ) -> StoreResult<Admission> {
        let now_unix = self.clock.now().timestamp().max(0) as u64;

        let mut checks = vec![ScopeCheck {
            scope_key: "global".to_string(),
            limit: self.settings.global.limit,
            window_secs: self.settings.global.window_secs,
        }];
        if let Some(hash) = source_hash {
            checks.push(ScopeCheck {
                scope_key: format!("ip:{hash}"),
                limit: self.settings.source.limit,
                window_secs: self.settings.source.window_secs,
            });
        }
        if let Some(hash) = subject_hash {
            checks.push(ScopeCheck {
                scope_key: format!("email:{hash}"),
                limit: self.settings.subject.limit,
                window_secs: self.settings.subject.window_secs,
            });
        }

        let usages = BucketRepository::new(&self.store).admit(now_unix, &checks)?;
        Ok(Admission::from_usages(&usages))
    }

    /// Widest configured window, the basis for the bucket GC horizon.
    pub fn widest_window_secs(&self) -> u64 {
        self.settings
            .global
            .window_secs
            .max(self.settings.source.window_secs)
            .max(self.settings.subject.window_secs)
    }

    /// Drop buckets older than twice the widest window.
    pub fn sweep(&self) -> StoreResult<u64> {
        let now_unix = self.clock.now().timestamp().max(0) as u64;
        BucketRepository::new(&self.store).prune(now_unix, self.widest_window_secs() * 2)
    }
}
