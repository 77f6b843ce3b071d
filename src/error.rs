// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! API error envelope.
//!
//! Every failure maps to one taxonomy code and renders as
//! `{"error": {"code", "message", "retryAfter"?}}`. Messages are written
//! for callers; internal detail stays in the logs. Expired and invalid
//! codes share a single taxonomy entry on purpose: distinguishing them
//! would hand probes an oracle for pending cleanups.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Machine-readable failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    RateLimited,
    LockConflict,
    CodeExpiredOrInvalid,
    SubjectNotFound,
    NotOrphaned,
    DeliveryUnavailable,
    TransactionalFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::RateLimited => "rate_limited",
            Self::LockConflict => "lock_conflict",
            Self::CodeExpiredOrInvalid => "code_expired_or_invalid",
            Self::SubjectNotFound => "subject_not_found",
            Self::NotOrphaned => "not_orphaned",
            Self::DeliveryUnavailable => "delivery_unavailable",
            Self::TransactionalFailure => "transactional_failure",
        }
    }
}

/// Budget detail attached to 429 responses.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u64,
    pub retry_after_secs: u64,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    pub rate_limit: Option<RateLimitInfo>,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

impl ApiError {
    fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            rate_limit: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::Validation, message)
    }

    pub fn rate_limited(limit: u32, remaining: u64, retry_after_secs: u64) -> Self {
        let mut error = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::RateLimited,
            "Too many requests. Try again later.",
        );
        error.rate_limit = Some(RateLimitInfo {
            limit,
            remaining,
            retry_after_secs,
        });
        error
    }

    pub fn lock_conflict() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            ErrorCode::LockConflict,
            "Another operation for this account is already in progress.",
        )
    }

    pub fn code_expired_or_invalid() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ErrorCode::CodeExpiredOrInvalid,
            "The verification code is invalid or has expired.",
        )
    }

    pub fn subject_not_found() -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ErrorCode::SubjectNotFound,
            "No account was found for this address.",
        )
    }

    pub fn not_orphaned() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            ErrorCode::NotOrphaned,
            "This account still has organization data and cannot be cleaned up.",
        )
    }

    pub fn delivery_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DeliveryUnavailable,
            "The verification code could not be delivered. Try again later.",
        )
    }

    /// Generic 500. Internal detail belongs in the logs, not here.
    pub fn transactional_failure() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::TransactionalFailure,
            "The operation could not be completed.",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.rate_limit.map(|info| info.retry_after_secs);
        let body = Json(ErrorBody {
            error: ErrorDetail {
                code: self.code.as_str(),
                message: self.message,
                retry_after,
            },
        });

        let mut response = (self.status, body).into_response();

        if let Some(info) = self.rate_limit {
            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&info.retry_after_secs.to_string()) {
                headers.insert("Retry-After", value);
            }
            if let Ok(value) = HeaderValue::from_str(&info.limit.to_string()) {
                headers.insert("X-RateLimit-Limit", value);
            }
            if let Ok(value) = HeaderValue::from_str(&info.remaining.to_string()) {
                headers.insert("X-RateLimit-Remaining", value);
            }
            if let Ok(value) = HeaderValue::from_str(&info.retry_after_secs.to_string()) {
                headers.insert("X-RateLimit-Reset", value);
            }
        }

        response
    }
}
