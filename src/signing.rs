// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Signing
//!
//! Every forwarded request carries three headers the upstream uses to
//! authenticate it:
//!
//! | Header | Value |
//! |--------|-------|
//! | `x-metrics-timestamp` | epoch milliseconds at signing time |
//! | `x-metrics-nonce` | 16 random bytes, lowercase hex |
//! | `x-metrics-signature` | lowercase hex HMAC-SHA3-512 |
//!
//! The MAC input is `n:<nonce>;t:<timestamp>;d:<body>`, keyed with the
//! UTF-8 bytes of the shared secret.
//!
//! ## Body encoding
//!
//! The body is rendered as UTF-8 with invalid sequences replaced by
//! U+FFFD before signing. UTF-8 bodies therefore sign byte-for-byte; a
//! verifier must apply the same lossy decoding to non-UTF-8 bodies. The
//! forwarded body itself is always the untouched raw bytes.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use chrono::Utc;
use hmac::{Hmac, Mac};
use ring::rand::{SecureRandom, SystemRandom};
use sha3::Sha3_512;

type HmacSha3_512 = Hmac<Sha3_512>;

pub const TIMESTAMP_HEADER: HeaderName = HeaderName::from_static("x-metrics-timestamp");
pub const NONCE_HEADER: HeaderName = HeaderName::from_static("x-metrics-nonce");
pub const SIGNATURE_HEADER: HeaderName = HeaderName::from_static("x-metrics-signature");

/// Nonce size in bytes (hex string is twice as long).
pub const NONCE_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("invalid HMAC key")]
    InvalidKey,

    #[error("system random number generator failed")]
    Rng,
}

/// Anti-replay metadata and signature for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub timestamp: i64,
    pub nonce: String,
    pub signature: String,
}

impl RequestSignature {
    /// Set the three signature headers, replacing any inbound values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from(self.timestamp));
        // Hex is always a valid header value.
        if let Ok(nonce) = HeaderValue::from_str(&self.nonce) {
            headers.insert(NONCE_HEADER, nonce);
        }
        if let Ok(signature) = HeaderValue::from_str(&self.signature) {
            headers.insert(SIGNATURE_HEADER, signature);
        }
    }
}

/// Canonical MAC input.
pub fn canonical_payload(nonce: &str, timestamp: i64, body: &[u8]) -> String {
    format!(
        "n:{nonce};t:{timestamp};d:{}",
        String::from_utf8_lossy(body)
    )
}

/// Holds the keyed MAC state; cloned for every request.
#[derive(Clone)]
pub struct RequestSigner {
    mac: HmacSha3_512,
    rng: SystemRandom,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(secret: &str) -> Result<Self, SigningError> {
        let mac = HmacSha3_512::new_from_slice(secret.as_bytes())
            .map_err(|_| SigningError::InvalidKey)?;
        Ok(Self {
            mac,
            rng: SystemRandom::new(),
        })
    }

    /// Sign a body with a fresh nonce and the current time.
    pub fn sign(&self, body: &[u8]) -> Result<RequestSignature, SigningError> {
        let nonce = self.generate_nonce()?;
        let timestamp = Utc::now().timestamp_millis();
        let signature = self.signature_for(&nonce, timestamp, body);

        Ok(RequestSignature {
            timestamp,
            nonce,
            signature,
        })
    }

    /// Deterministic signature over the canonical payload.
    pub fn signature_for(&self, nonce: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(canonical_payload(nonce, timestamp, body).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn generate_nonce(&self) -> Result<String, SigningError> {
        let mut bytes = [0u8; NONCE_LENGTH];
        self.rng.fill(&mut bytes).map_err(|_| SigningError::Rng)?;
        Ok(hex::encode(bytes))
    }
}
