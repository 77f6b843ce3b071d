// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subject directory collaborator.
//!
//! The cleanup service does not own the user store. It consumes a narrow
//! query contract (lookup by email, two ownership-evidence booleans, and
//! the deletion primitive) behind the [`SubjectDirectory`] capability.
//!
//! Two implementations: [`HttpDirectory`] against the internal directory
//! API, and [`MemoryDirectory`] for development mode and tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::{DIRECTORY_API_TOKEN_ENV, DIRECTORY_BASE_URL_ENV};

/// Directory view of a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRecord {
    pub id: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Request(String),

    #[error("directory response was invalid: {0}")]
    InvalidResponse(String),
}

/// Query contract the cleanup core needs from the user directory.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<SubjectRecord>, DirectoryError>;

    /// Evidence query 1: the subject owns an organization.
    async fn owns_organization(&self, subject_id: &str) -> Result<bool, DirectoryError>;

    /// Evidence query 2: the subject administers an organization.
    async fn administers_organization(&self, subject_id: &str) -> Result<bool, DirectoryError>;

    /// Irreversibly delete the subject's account record.
    async fn delete_subject(&self, subject_id: &str) -> Result<(), DirectoryError>;
}

// =============================================================================
// HTTP implementation
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSubject {
    id: String,
    verified_at: Option<DateTime<Utc>>,
    last_sign_in_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireBool {
    result: bool,
}

/// Directory client against the internal directory API.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    base_url: String,
    api_token: Option<String>,
    http: Client,
}

impl HttpDirectory {
    pub fn is_configured() -> bool {
        std::env::var(DIRECTORY_BASE_URL_ENV).is_ok_and(|v| !v.trim().is_empty())
    }

    pub fn from_env() -> Result<Self, DirectoryError> {
        let base_url = std::env::var(DIRECTORY_BASE_URL_ENV)
            .map_err(|_| DirectoryError::Request(format!("{DIRECTORY_BASE_URL_ENV} is required")))?
            .trim_end_matches('/')
            .to_string();
        let api_token = std::env::var(DIRECTORY_API_TOKEN_ENV).ok();

        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DirectoryError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            api_token,
            http,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn evidence(&self, path: &str) -> Result<bool, DirectoryError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DirectoryError::Request(format!(
                "evidence lookup returned {}",
                response.status()
            )));
        }

        let body: WireBool = response
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;
        Ok(body.result)
    }
}

#[async_trait]
impl SubjectDirectory for HttpDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<SubjectRecord>, DirectoryError> {
        let response = self
            .request(reqwest::Method::POST, "/directory/find-by-email")
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(DirectoryError::Request(format!(
                "lookup returned {}",
                response.status()
            )));
        }

        let wire: WireSubject = response
            .json()
            .await
            .map_err(|e| DirectoryError::InvalidResponse(e.to_string()))?;
        Ok(Some(SubjectRecord {
            id: wire.id,
            verified_at: wire.verified_at,
            last_sign_in_at: wire.last_sign_in_at,
        }))
    }

    async fn owns_organization(&self, subject_id: &str) -> Result<bool, DirectoryError> {
        self.evidence(&format!("/directory/{subject_id}/owns-organization"))
            .await
    }

    async fn administers_organization(&self, subject_id: &str) -> Result<bool, DirectoryError> {
        self.evidence(&format!("/directory/{subject_id}/administers-organization"))
            .await
    }

    async fn delete_subject(&self, subject_id: &str) -> Result<(), DirectoryError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/directory/{subject_id}"))
            .send()
            .await
            .map_err(|e| DirectoryError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DirectoryError::Request(format!(
                "delete returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// In-memory implementation (development mode, tests)
// =============================================================================

#[derive(Default)]
struct MemoryState {
    records: HashMap<String, SubjectRecord>,
    owners: HashSet<String>,
    admins: HashSet<String>,
    deleted: Vec<String>,
}

/// In-process directory for development mode and tests.
#[derive(Default)]
pub struct MemoryDirectory {
    state: Mutex<MemoryState>,
    fail_evidence: AtomicBool,
    fail_deletion: AtomicBool,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, email: &str, record: SubjectRecord) {
        let mut state = self.state.lock().expect("directory poisoned");
        state.records.insert(email.to_string(), record);
    }

    pub fn grant_ownership(&self, subject_id: &str) {
        let mut state = self.state.lock().expect("directory poisoned");
        state.owners.insert(subject_id.to_string());
    }

    pub fn grant_admin(&self, subject_id: &str) {
        let mut state = self.state.lock().expect("directory poisoned");
        state.admins.insert(subject_id.to_string());
    }

    /// Subject ids deleted so far, in deletion order.
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().expect("directory poisoned").deleted.clone()
    }

    /// Make the ownership-evidence queries fail (degraded-directory mode).
    pub fn set_evidence_failure(&self, fail: bool) {
        self.fail_evidence.store(fail, Ordering::SeqCst);
    }

    /// Make deletion fail (transactional-failure mode).
    pub fn set_deletion_failure(&self, fail: bool) {
        self.fail_deletion.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubjectDirectory for MemoryDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<SubjectRecord>, DirectoryError> {
        let state = self.state.lock().expect("directory poisoned");
        Ok(state.records.get(email).cloned())
    }

    async fn owns_organization(&self, subject_id: &str) -> Result<bool, DirectoryError> {
        if self.fail_evidence.load(Ordering::SeqCst) {
            return Err(DirectoryError::Request("evidence lookup failed".into()));
        }
        let state = self.state.lock().expect("directory poisoned");
        Ok(state.owners.contains(subject_id))
    }

    async fn administers_organization(&self, subject_id: &str) -> Result<bool, DirectoryError> {
        if self.fail_evidence.load(Ordering::SeqCst) {
            return Err(DirectoryError::Request("evidence lookup failed".into()));
        }
        let state = self.state.lock().expect("directory poisoned");
        Ok(state.admins.contains(subject_id))
    }

    async fn delete_subject(&self, subject_id: &str) -> Result<(), DirectoryError> {
        if self.fail_deletion.load(Ordering::SeqCst) {
            return Err(DirectoryError::Request("deletion failed".into()));
        }
        let mut state = self.state.lock().expect("directory poisoned");
        state.records.retain(|_, record| record.id != subject_id);
        state.deleted.push(subject_id.to_string());
        Ok(())
    }
}
