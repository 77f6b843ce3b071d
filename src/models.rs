// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response structures for the status and cleanup endpoints.
//! The wire contract is camelCase JSON; the cleanup request is a tagged
//! union on `step`, so dispatch is a pure match on the deserialized
//! variant rather than runtime field sniffing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Status Probe
// =============================================================================

/// Registration state of a subject address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    NotRegistered,
    RegisteredVerified,
    RegisteredUnverified,
}

/// Request body for `POST /v1/check-status`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatusRequest {
    pub email: String,
    /// Opaque client-side token, echoed back verbatim.
    #[serde(default)]
    pub attempt_id: Option<String>,
}

/// Response body for `POST /v1/check-status`.
///
/// `has_company_data` and `is_orphaned` are `null` when the ownership
/// lookup failed or timed out: unknown, not a verdict.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatusResponse {
    pub status: RegistrationStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub has_company_data: Option<bool>,
    pub is_orphaned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    pub correlation_id: String,
}

// =============================================================================
// Cleanup Flow
// =============================================================================

/// Request body for `POST /v1/cleanup`, discriminated by `step`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "step")]
pub enum CleanupRequest {
    /// Step 1: verify the account is orphaned and email a code.
    #[serde(rename = "request-code", rename_all = "camelCase")]
    RequestCode {
        email: String,
        #[serde(default)]
        correlation_id: Option<String>,
    },

    /// Step 2: validate the code and delete the account.
    #[serde(rename = "validate-and-cleanup", rename_all = "camelCase")]
    ValidateAndCleanup {
        email: String,
        verification_code: String,
        #[serde(default)]
        correlation_id: Option<String>,
    },
}

/// Success body for both cleanup steps.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub message: String,
    pub correlation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_request_dispatches_on_the_step_tag() {
        let step1: CleanupRequest = serde_json::from_str(
            r#"{"step": "request-code", "email": "a@example.com"}"#,
        )
        .unwrap();
        assert!(matches!(
            step1,
            CleanupRequest::RequestCode {
                ref email,
                correlation_id: None,
            } if email == "a@example.com"
        ));

        let step2: CleanupRequest = serde_json::from_str(
            r#"{
                "step": "validate-and-cleanup",
                "email": "a@example.com",
                "verificationCode": "ABCD2345",
                "correlationId": "corr-1"
            }"#,
        )
        .unwrap();
        assert!(matches!(
            step2,
            CleanupRequest::ValidateAndCleanup {
                ref verification_code,
                correlation_id: Some(ref corr),
                ..
            } if verification_code == "ABCD2345" && corr == "corr-1"
        ));
    }

    #[test]
    fn unknown_step_is_rejected_at_deserialization() {
        let result: Result<CleanupRequest, _> =
            serde_json::from_str(r#"{"step": "delete-now", "email": "a@example.com"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn status_response_serializes_camel_case_with_explicit_nulls() {
        let response = CheckStatusResponse {
            status: RegistrationStatus::RegisteredVerified,
            verified_at: None,
            last_sign_in_at: None,
            has_company_data: None,
            is_orphaned: None,
            attempt_id: None,
            correlation_id: "corr-1".to_string(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "registered_verified");
        assert!(json["hasCompanyData"].is_null());
        assert!(json["isOrphaned"].is_null());
        assert_eq!(json["correlationId"], "corr-1");
        // attemptId is omitted entirely when absent.
        assert!(json.get("attemptId").is_none());
    }

    #[test]
    fn cleanup_response_serializes_camel_case() {
        let response = CleanupResponse {
            message: "done".to_string(),
            correlation_id: "corr-9".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["correlationId"], "corr-9");
    }
}
