// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity verifier contract.
//!
//! Cryptographic verification is delegated entirely to the identity provider.
//! The pipeline only sees this trait, so tests and alternative providers can
//! plug in without touching the caches.

use async_trait::async_trait;

/// Identity produced by a successful token verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Identity provider's user id (not the application's principal id).
    pub external_id: String,
    /// Email carried by the token, if the provider included one.
    pub email: Option<String>,
}

/// Errors returned by an identity verifier.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("token is malformed")]
    Malformed,

    #[error("token has expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token claims rejected: {0}")]
    InvalidClaims(String),

    #[error("no matching signing key")]
    NoMatchingKey,

    #[error("failed to fetch signing keys: {0}")]
    KeySet(String),

    #[error("user record not found: {0}")]
    UserNotFound(String),

    #[error("identity provider error: {0}")]
    Upstream(String),
}

/// Identity provider collaborator.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Validate a bearer token and return the identity it was issued for.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError>;

    /// Fetch the email on the provider's user record.
    async fn user_email(&self, external_id: &str) -> Result<String, VerifyError>;

    /// Whether the verifier can currently verify tokens (used by readiness).
    async fn is_ready(&self) -> bool {
        true
    }
}
