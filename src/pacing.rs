// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Constant-time response shaping.
//!
//! Every padded branch of the cleanup flow sleeps until the same target
//! latency, plus Gaussian jitter, before the response goes out. Whether
//! the branch did a directory lookup, a digest comparison, or a full email
//! dispatch, the wall-clock signature looks the same, so latency carries
//! no information about which branch executed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};

use crate::clock::Clock;
use crate::config::PaddingSettings;

/// Pads responses to a uniform latency target.
#[derive(Clone)]
pub struct ResponsePacer {
    clock: Arc<dyn Clock>,
    settings: PaddingSettings,
    rng: SystemRandom,
}

impl ResponsePacer {
    pub fn new(clock: Arc<dyn Clock>, settings: PaddingSettings) -> Self {
        Self {
            clock,
            settings,
            rng: SystemRandom::new(),
        }
    }

    /// Sleep until `target + jitter` milliseconds have passed since
    /// `started_at`. A branch that already overran the target returns
    /// immediately.
    pub async fn pad(&self, started_at: DateTime<Utc>) {
        let elapsed_ms = (self.clock.now() - started_at).num_milliseconds().max(0) as f64;
        let jitter_ms = self.gaussian() * self.settings.jitter_std_dev_ms as f64;
        let remaining_ms = self.settings.target_ms as f64 + jitter_ms - elapsed_ms;

        if remaining_ms > 0.0 {
            self.clock
                .sleep(std::time::Duration::from_secs_f64(remaining_ms / 1000.0))
                .await;
        }
    }

    /// Standard normal draw via Box–Muller over two uniform samples.
    fn gaussian(&self) -> f64 {
        let mut bytes = [0u8; 16];
        if self.rng.fill(&mut bytes).is_err() {
            // Padding still happens at the flat target; only the jitter is lost.
            return 0.0;
        }

        let a = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        let b = u64::from_le_bytes(bytes[8..].try_into().expect("8 bytes"));

        // 53-bit mantissa uniforms; u1 in (0,1] so ln(u1) is finite.
        let u1 = ((a >> 11) as f64 + 1.0) / (1u64 << 53) as f64;
        let u2 = (b >> 11) as f64 / (1u64 << 53) as f64;

        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}
