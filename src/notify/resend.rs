// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resend transactional-email provider (secondary).

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{CodeEmail, NotificationError, NotificationProvider};

const API_URL: &str = "https://api.resend.com/emails";
const PROVIDER_NAME: &str = "resend";

#[derive(Debug, Serialize)]
struct ResendSendBody {
    from: String,
    to: Vec<String>,
    subject: String,
    text: String,
}

/// Resend API client.
#[derive(Debug, Clone)]
pub struct ResendProvider {
    api_key: String,
    sender_email: String,
    http: Client,
}

impl ResendProvider {
    pub fn is_configured() -> bool {
        required_env_present("RESEND_API_KEY") && required_env_present("RESEND_SENDER_EMAIL")
    }

    pub fn from_env() -> Result<Self, NotificationError> {
        let api_key = env_required("RESEND_API_KEY")?;
        let sender_email = env_required("RESEND_SENDER_EMAIL")?;

        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| provider_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            sender_email,
            http,
        })
    }
}

#[async_trait]
impl NotificationProvider for ResendProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn send(&self, email: &CodeEmail) -> Result<(), NotificationError> {
        let body = ResendSendBody {
            from: self.sender_email.clone(),
            to: vec![email.to.clone()],
            subject: email.subject_line(),
            text: email.text_body(),
        };

        let response = self
            .http
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_error(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        Err(provider_error(format!("status={status}: {detail}")))
    }
}

fn provider_error(message: String) -> NotificationError {
    NotificationError::Provider {
        provider: PROVIDER_NAME,
        message,
    }
}

fn required_env_present(key: &str) -> bool {
    env::var(key).is_ok_and(|v| !v.trim().is_empty())
}

fn env_required(key: &str) -> Result<String, NotificationError> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| provider_error(format!("{key} is required")))
}
