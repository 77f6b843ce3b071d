// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Subject identity derivation.
//!
//! The subject of every cleanup operation is an email address. Raw
//! addresses never reach persistent storage: rows are keyed by a peppered
//! HMAC-SHA-256 over the normalized address, so a leaked database cannot be
//! reversed into a mailing list. The same digest also yields the 64-bit
//! advisory-lock key and the subject-scoped rate-limit key, keeping all
//! three views of one subject consistent.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use unicode_normalization::UnicodeNormalization;

type HmacSha256 = Hmac<Sha256>;

/// Normalize a raw email address: trim, NFKC-fold, lowercase.
///
/// Returns `None` when the input does not look like a deliverable address.
/// Validation is deliberately shallow (single `@`, dotted domain); the
/// directory is the authority on whether the address exists.
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return None;
    }

    let normalized: String = trimmed.nfkc().collect::<String>().to_lowercase();

    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return None;
    }

    Some(normalized)
}

/// Deterministic digest of a normalized subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectId {
    digest: [u8; 32],
}

impl SubjectId {
    /// Storage key: unpadded base64url of the full digest.
    pub fn storage_key(&self) -> String {
        Base64UrlUnpadded::encode_string(&self.digest)
    }

    /// Advisory-lock key: first 8 digest bytes, big-endian.
    pub fn lock_key(&self) -> u64 {
        u64::from_be_bytes(self.digest[..8].try_into().expect("digest is 32 bytes"))
    }
}

/// Peppered subject hasher shared by all subsystems.
#[derive(Clone)]
pub struct SubjectHasher {
    pepper: Vec<u8>,
}

impl SubjectHasher {
    pub fn new(pepper: impl Into<Vec<u8>>) -> Self {
        Self {
            pepper: pepper.into(),
        }
    }

    /// HMAC-SHA-256 over a normalized email address.
    pub fn subject_id(&self, normalized_email: &str) -> SubjectId {
        SubjectId {
            digest: self.digest(normalized_email.as_bytes()),
        }
    }

    /// Short hash of a source identifier (client IP) for rate-limit keys.
    ///
    /// Truncated to 12 bytes: scope keys are high-churn rows, not lookups
    /// that need collision resistance against an offline attacker.
    pub fn source_hash(&self, source: &str) -> String {
        let digest = self.digest(source.as_bytes());
        Base64UrlUnpadded::encode_string(&digest[..12])
    }

    fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut mac =
            HmacSha256::new_from_slice(&self.pepper).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}
