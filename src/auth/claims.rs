// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ID token claims issued by the identity provider.

use serde::Deserialize;

use super::verifier::{VerifiedIdentity, VerifyError};

/// Claims of a Firebase ID token.
///
/// `exp`, `iat`, `iss` and `aud` are checked by `jsonwebtoken` during
/// decoding; the remaining checks happen in [`IdTokenClaims::into_identity`].
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    /// Subject: the provider's user id
    pub sub: String,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Issuer (`https://securetoken.google.com/<project>`)
    pub iss: String,

    /// Time the user authenticated
    #[serde(default)]
    pub auth_time: Option<i64>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: Option<bool>,
}

impl IdTokenClaims {
    /// Validate the claims `jsonwebtoken` does not know about and extract
    /// the identity.
    pub fn into_identity(self, now: i64) -> Result<VerifiedIdentity, VerifyError> {
        if self.sub.is_empty() || self.sub.len() > 128 {
            return Err(VerifyError::InvalidClaims(
                "sub must be a non-empty string of at most 128 characters".into(),
            ));
        }
        if let Some(auth_time) = self.auth_time {
            if auth_time > now {
                return Err(VerifyError::InvalidClaims("auth_time is in the future".into()));
            }
        }

        Ok(VerifiedIdentity {
            external_id: self.sub,
            email: self.email.filter(|e| !e.is_empty()),
        })
    }
}
