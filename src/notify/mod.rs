// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification-code delivery with provider failover.
//!
//! Providers form an ordered chain behind one `send` capability. Each
//! provider gets the full retry schedule (`0s, 1s, 2s` before attempts
//! 1-3) before the dispatcher fails over to the next. Only when every
//! provider has exhausted its budget does the caller see the terminal
//! `delivery unavailable` outcome, a distinct error kind never conflated
//! with validation or rate-limit failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::clock::Clock;

pub mod brevo;
pub mod resend;

pub use brevo::BrevoProvider;
pub use resend::ResendProvider;

/// Outbound verification-code message.
#[derive(Debug, Clone)]
pub struct CodeEmail {
    pub to: String,
    pub code: String,
    pub correlation_id: String,
    /// Minutes until the code expires, for the message body.
    pub ttl_minutes: i64,
}

impl CodeEmail {
    pub fn subject_line(&self) -> String {
        "Your account deletion verification code".to_string()
    }

    pub fn text_body(&self) -> String {
        format!(
            "Your verification code is {}.\n\n\
             It expires in {} minutes. If you did not request account \
             deletion, you can ignore this message.",
            self.code, self.ttl_minutes
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("provider {provider} rejected the message: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("all delivery providers exhausted their retries")]
    Exhausted,
}

/// One mail vendor behind the common send capability.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, email: &CodeEmail) -> Result<(), NotificationError>;
}

/// Which provider delivered, on which attempt (1-based, per provider).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub provider: &'static str,
    pub attempt: usize,
}

/// Iterates the provider chain with per-provider retry budgets.
#[derive(Clone)]
pub struct NotificationDispatcher {
    providers: Vec<Arc<dyn NotificationProvider>>,
    clock: Arc<dyn Clock>,
    backoff: Vec<Duration>,
}

impl NotificationDispatcher {
    pub fn new(providers: Vec<Arc<dyn NotificationProvider>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            providers,
            clock,
            backoff: vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2),
            ],
        }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn send(&self, email: &CodeEmail) -> Result<DeliveryReceipt, NotificationError> {
        for provider in &self.providers {
            for (index, delay) in self.backoff.iter().enumerate() {
                if !delay.is_zero() {
                    self.clock.sleep(*delay).await;
                }

                match provider.send(email).await {
                    Ok(()) => {
                        let receipt = DeliveryReceipt {
                            provider: provider.name(),
                            attempt: index + 1,
                        };
                        tracing::info!(
                            provider = receipt.provider,
                            attempt = receipt.attempt,
                            correlation_id = %email.correlation_id,
                            "verification code dispatched"
                        );
                        return Ok(receipt);
                    }
                    Err(err) => {
                        tracing::warn!(
                            provider = provider.name(),
                            attempt = index + 1,
                            correlation_id = %email.correlation_id,
                            error = %err,
                            "delivery attempt failed"
                        );
                    }
                }
            }
        }

        tracing::error!(
            correlation_id = %email.correlation_id,
            "all delivery providers exhausted"
        );
        Err(NotificationError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn email() -> CodeEmail {
        CodeEmail {
            to: "subject@example.com".to_string(),
            code: "ABCD2345".to_string(),
            correlation_id: "corr-1".to_string(),
            ttl_minutes: 5,
        }
    }

    /// Fails the first `failures` sends, then succeeds.
    struct FlakyProvider {
        name: &'static str,
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyProvider {
        fn new(name: &'static str, failures: usize) -> Arc<Self> {
            Arc::new(Self {
                name,
                failures,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, _email: &CodeEmail) -> Result<(), NotificationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(NotificationError::Provider {
                    provider: self.name,
                    message: "simulated outage".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn dispatcher(
        providers: Vec<Arc<dyn NotificationProvider>>,
    ) -> (NotificationDispatcher, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (NotificationDispatcher::new(providers, clock.clone()), clock)
    }

    #[tokio::test]
    async fn first_attempt_success_sleeps_never() {
        let primary = FlakyProvider::new("primary", 0);
        let (dispatcher, clock) = dispatcher(vec![primary.clone()]);

        let receipt = dispatcher.send(&email()).await.unwrap();
        assert_eq!(receipt, DeliveryReceipt { provider: "primary", attempt: 1 });
        assert!(clock.slept().is_empty());
    }

    #[tokio::test]
    async fn retries_follow_the_backoff_schedule() {
        let primary = FlakyProvider::new("primary", 2);
        let (dispatcher, clock) = dispatcher(vec![primary.clone()]);

        let receipt = dispatcher.send(&email()).await.unwrap();
        assert_eq!(receipt.attempt, 3);
        assert_eq!(
            clock.slept(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn failover_reaches_the_secondary_with_a_fresh_budget() {
        let primary = FlakyProvider::new("primary", usize::MAX);
        let secondary = FlakyProvider::new("secondary", 1);
        let (dispatcher, clock) = dispatcher(vec![primary.clone(), secondary.clone()]);

        let receipt = dispatcher.send(&email()).await.unwrap();
        assert_eq!(receipt.provider, "secondary");
        assert_eq!(receipt.attempt, 2);
        assert_eq!(primary.calls(), 3, "primary used its whole budget");
        // Primary retries (1s, 2s) then secondary's first retry (1s).
        assert_eq!(
            clock.slept(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(1)
            ]
        );
    }

    #[tokio::test]
    async fn exhaustion_is_terminal_and_distinct() {
        let primary = FlakyProvider::new("primary", usize::MAX);
        let secondary = FlakyProvider::new("secondary", usize::MAX);
        let (dispatcher, _clock) = dispatcher(vec![primary.clone(), secondary.clone()]);

        let err = dispatcher.send(&email()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Exhausted));
        assert_eq!(primary.calls(), 3);
        assert_eq!(secondary.calls(), 3);
    }

    #[tokio::test]
    async fn empty_chain_is_immediately_exhausted() {
        let (dispatcher, clock) = dispatcher(vec![]);

        let err = dispatcher.send(&email()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Exhausted));
        assert!(clock.slept().is_empty());
    }

    #[test]
    fn body_mentions_code_and_expiry() {
        let email = email();
        let body = email.text_body();
        assert!(body.contains("ABCD2345"));
        assert!(body.contains("5 minutes"));
    }
}
