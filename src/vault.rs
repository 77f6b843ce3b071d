// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification code vault.
//!
//! Issues short-lived one-time codes and validates submissions against the
//! stored salted digest. The raw code exists only in the issuing response
//! path and the outbound email; storage sees the digest.
//!
//! Validation deliberately collapses "no code", "expired", and "wrong
//! code" into one `false`. The caller must not be able to distinguish
//! them, or the endpoint becomes an oracle for which addresses have a
//! pending cleanup.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::storage::{CodeRepository, Store, StoreError, StoredCode};

/// Code alphabet: visually unambiguous (no `0/O`, no `1/I/L`).
/// Fixed; digests are computed over these exact bytes.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Characters per code.
pub const CODE_LENGTH: usize = 8;

const SALT_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("secure randomness unavailable")]
    Rng,
}

/// Generates, stores, and validates hashed verification codes.
#[derive(Clone)]
pub struct CodeVault {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    rng: SystemRandom,
}

impl CodeVault {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            rng: SystemRandom::new(),
        }
    }

    /// Issue a fresh code for the subject, superseding any live one.
    ///
    /// Returns the raw code for delivery; it is never persisted.
    pub fn issue(&self, subject_key: &str, correlation_id: &str) -> Result<String, VaultError> {
        let raw = self.generate_code()?;

        let mut salt = [0u8; SALT_LENGTH];
        self.rng.fill(&mut salt).map_err(|_| VaultError::Rng)?;

        let now = self.clock.now();
        let row = StoredCode {
            subject_key: subject_key.to_string(),
            code_hash: digest_code(raw.as_bytes(), &salt),
            code_salt: Base64UrlUnpadded::encode_string(&salt),
            correlation_id: correlation_id.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        CodeRepository::new(&self.store).upsert(&row)?;

        Ok(raw)
    }

    /// Validate a submitted code. One generic `false` for absent, expired,
    /// and mismatched codes; never extends the TTL; never consumes the row.
    pub fn validate(&self, subject_key: &str, submitted: &str) -> Result<bool, VaultError> {
        let Some(row) = CodeRepository::new(&self.store).get(subject_key)? else {
            return Ok(false);
        };

        let salt = match Base64UrlUnpadded::decode_vec(&row.code_salt) {
            Ok(salt) => salt,
            Err(_) => return Ok(false),
        };

        // Codes arrive from humans: strip whitespace, fold case.
        let submitted: String = submitted
            .trim()
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .collect();

        // Compare before the expiry check so both failure kinds do the
        // same digest work.
        let computed = digest_code(submitted.as_bytes(), &salt);
        let matches = constant_time_eq(computed.as_bytes(), row.code_hash.as_bytes());
        let live = !row.is_expired(self.clock.now());

        Ok(matches && live)
    }

    /// Delete the subject's code after successful consumption.
    pub fn revoke(&self, subject_key: &str) -> Result<bool, VaultError> {
        Ok(CodeRepository::new(&self.store).delete(subject_key)?)
    }

    /// Reap expired rows.
    pub fn sweep(&self) -> Result<u64, VaultError> {
        Ok(CodeRepository::new(&self.store).purge_expired(self.clock.now())?)
    }

    /// Draw a code from the fixed alphabet with rejection sampling, so
    /// every character is uniform.
    fn generate_code(&self) -> Result<String, VaultError> {
        debug_assert!(CODE_ALPHABET.len() == 31);
        // Largest multiple of the alphabet size below 256.
        let bound = (256 / CODE_ALPHABET.len() * CODE_ALPHABET.len()) as u16;

        let mut code = String::with_capacity(CODE_LENGTH);
        while code.len() < CODE_LENGTH {
            let mut batch = [0u8; 16];
            self.rng.fill(&mut batch).map_err(|_| VaultError::Rng)?;
            for byte in batch {
                if u16::from(byte) < bound {
                    code.push(CODE_ALPHABET[usize::from(byte) % CODE_ALPHABET.len()] as char);
                    if code.len() == CODE_LENGTH {
                        break;
                    }
                }
            }
        }
        Ok(code)
    }
}

fn digest_code(code: &[u8], salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code);
    hasher.update(salt);
    Base64UrlUnpadded::encode_string(&hasher.finalize())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    ring::constant_time::verify_slices_are_equal(a, b).is_ok()
}
