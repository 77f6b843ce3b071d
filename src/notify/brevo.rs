// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Brevo transactional-email provider (primary).

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{CodeEmail, NotificationError, NotificationProvider};

const API_URL: &str = "https://api.brevo.com/v3/smtp/email";
const PROVIDER_NAME: &str = "brevo";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoSendBody {
    sender: BrevoAddress,
    to: Vec<BrevoAddress>,
    subject: String,
    text_content: String,
}

/// Brevo SMTP API client.
#[derive(Debug, Clone)]
pub struct BrevoProvider {
    api_key: String,
    sender_email: String,
    sender_name: Option<String>,
    http: Client,
}

impl BrevoProvider {
    pub fn is_configured() -> bool {
        required_env_present("BREVO_API_KEY") && required_env_present("BREVO_SENDER_EMAIL")
    }

    pub fn from_env() -> Result<Self, NotificationError> {
        let api_key = env_required("BREVO_API_KEY")?;
        let sender_email = env_required("BREVO_SENDER_EMAIL")?;
        let sender_name = env::var("BREVO_SENDER_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| provider_error(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            sender_email,
            sender_name,
            http,
        })
    }
}

#[async_trait]
impl NotificationProvider for BrevoProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn send(&self, email: &CodeEmail) -> Result<(), NotificationError> {
        let body = BrevoSendBody {
            sender: BrevoAddress {
                email: self.sender_email.clone(),
                name: self.sender_name.clone(),
            },
            to: vec![BrevoAddress {
                email: email.to.clone(),
                name: None,
            }],
            subject: email.subject_line(),
            text_content: email.text_body(),
        };

        let response = self
            .http
            .post(API_URL)
            .header("api-key", &self.api_key)
            .header("Accept", "application/json")
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
