// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for the coordination database | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SUBJECT_PEPPER` | Secret pepper for subject hashing | dev placeholder |
//! | `DIRECTORY_BASE_URL` | Internal user-directory API | unset → in-memory dev directory |
//! | `DIRECTORY_API_TOKEN` | Bearer token for the directory API | Optional |
//! | `BREVO_API_KEY` / `BREVO_SENDER_EMAIL` | Primary mail vendor | unset → provider skipped |
//! | `RESEND_API_KEY` / `RESEND_SENDER_EMAIL` | Secondary mail vendor | unset → provider skipped |
//! | `RATE_LIMIT_GLOBAL` | Global scope as `limit/window_secs` | `1000/60` |
//! | `RATE_LIMIT_SOURCE` | Source scope as `limit/window_secs` | `5/60` |
//! | `RATE_LIMIT_SUBJECT` | Subject scope as `limit/window_secs` | `3/3600` |
//! | `PAD_TARGET_MS` | Constant-time response target | `500` |
//! | `PAD_JITTER_STD_DEV_MS` | Gaussian jitter std deviation | `25` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::env;
use std::path::PathBuf;

/// Environment variable name for the coordination database directory.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Secret pepper mixed into every subject hash. Must be identical across
/// instances sharing a data directory, or they will not see each other's
/// rows.
pub const SUBJECT_PEPPER_ENV: &str = "SUBJECT_PEPPER";

pub const DIRECTORY_BASE_URL_ENV: &str = "DIRECTORY_BASE_URL";
pub const DIRECTORY_API_TOKEN_ENV: &str = "DIRECTORY_API_TOKEN";

pub const RATE_LIMIT_GLOBAL_ENV: &str = "RATE_LIMIT_GLOBAL";
pub const RATE_LIMIT_SOURCE_ENV: &str = "RATE_LIMIT_SOURCE";
pub const RATE_LIMIT_SUBJECT_ENV: &str = "RATE_LIMIT_SUBJECT";

pub const PAD_TARGET_MS_ENV: &str = "PAD_TARGET_MS";
pub const PAD_JITTER_STD_DEV_MS_ENV: &str = "PAD_JITTER_STD_DEV_MS";

const DEV_PEPPER: &str = "dev-insecure-pepper";

/// One admission scope: request budget over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeLimit {
    pub limit: u32,
    pub window_secs: u64,
}

impl ScopeLimit {
    /// Parse `limit/window_secs`, e.g. `5/60`.
    fn parse(raw: &str) -> Option<Self> {
        let (limit, window) = raw.split_once('/')?;
        Some(Self {
            limit: limit.trim().parse().ok()?,
            window_secs: window.trim().parse().ok()?,
        })
    }
}

/// The three admission scopes applied per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub global: ScopeLimit,
    pub source: ScopeLimit,
    pub subject: ScopeLimit,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            global: ScopeLimit {
                limit: 1000,
                window_secs: 60,
            },
            source: ScopeLimit {
                limit: 5,
                window_secs: 60,
            },
            subject: ScopeLimit {
                limit: 3,
                window_secs: 3600,
            },
        }
    }
}

/// Constant-time response shaping parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddingSettings {
    pub target_ms: u64,
    pub jitter_std_dev_ms: u64,
}

impl Default for PaddingSettings {
    fn default() -> Self {
        Self {
            target_ms: 500,
            jitter_std_dev_ms: 25,
        }
    }
}

/// Full runtime configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub subject_pepper: String,
    pub rate_limits: RateLimitSettings,
    pub padding: PaddingSettings,
    /// Verification code lifetime.
    pub code_ttl_secs: i64,
    /// Advisory lock claim TTL (crash-recovery horizon).
    pub lock_ttl_secs: i64,
    /// Joint budget for the two ownership lookups.
    pub resolver_timeout_ms: u64,
    /// Cadence of the expiry/GC sweeper.
    pub sweep_interval_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
            host: "0.0.0.0".to_string(),
            port: 8080,
            subject_pepper: DEV_PEPPER.to_string(),
            rate_limits: RateLimitSettings::default(),
            padding: PaddingSettings::default(),
            code_ttl_secs: 300,
            lock_ttl_secs: 120,
            resolver_timeout_ms: 100,
            sweep_interval_secs: 60,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let subject_pepper = env_or(SUBJECT_PEPPER_ENV, DEV_PEPPER);
        if subject_pepper == DEV_PEPPER {
            tracing::warn!(
                "{SUBJECT_PEPPER_ENV} not set; using the development pepper, \
                 subject hashes are not private"
            );
        }

        Self {
            data_dir: PathBuf::from(env_or(DATA_DIR_ENV, "/data")),
            host: env_or(HOST_ENV, &defaults.host),
            port: env_parse_or(PORT_ENV, defaults.port),
            subject_pepper,
            rate_limits: RateLimitSettings {
                global: scope_limit_or(RATE_LIMIT_GLOBAL_ENV, defaults.rate_limits.global),
                source: scope_limit_or(RATE_LIMIT_SOURCE_ENV, defaults.rate_limits.source),
                subject: scope_limit_or(RATE_LIMIT_SUBJECT_ENV, defaults.rate_limits.subject),
            },
            padding: PaddingSettings {
                target_ms: env_parse_or(PAD_TARGET_MS_ENV, defaults.padding.target_ms),
                jitter_std_dev_ms: env_parse_or(
                    PAD_JITTER_STD_DEV_MS_ENV,
                    defaults.padding.jitter_std_dev_ms,
                ),
            },
            ..defaults
        }
    }

    pub fn code_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.code_ttl_secs)
    }

    pub fn lock_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lock_ttl_secs)
    }

    pub fn resolver_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.resolver_timeout_ms)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn scope_limit_or(key: &str, default: ScopeLimit) -> ScopeLimit {
    env::var(key)
        .ok()
        .and_then(|value| ScopeLimit::parse(&value))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_budgets() {
        let config = RuntimeConfig::default();
        assert_eq!(config.rate_limits.global.limit, 1000);
        assert_eq!(config.rate_limits.source.limit, 5);
        assert_eq!(config.rate_limits.subject.window_secs, 3600);
        assert_eq!(config.padding.target_ms, 500);
        assert_eq!(config.code_ttl_secs, 300);
    }

    #[test]
    fn scope_limit_parses_limit_slash_window() {
        assert_eq!(
            ScopeLimit::parse("10/120"),
            Some(ScopeLimit {
                limit: 10,
                window_secs: 120
            })
        );
        assert_eq!(ScopeLimit::parse(" 7 / 30 "), Some(ScopeLimit { limit: 7, window_secs: 30 }));
        assert_eq!(ScopeLimit::parse("nonsense"), None);
        assert_eq!(ScopeLimit::parse("5"), None);
    }
}
