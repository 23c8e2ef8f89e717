// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Firebase-backed identity verifier.
//!
//! ## Token verification
//!
//! 1. Read `kid` from the token header
//! 2. Look the key up in Google's securetoken JWKS (cached)
//! 3. Verify signature, `exp`, `iss = https://securetoken.google.com/<project>`
//!    and `aud = <project>`
//!
//! ## User records
//!
//! Emails for identities whose token was served from cache are fetched from
//! the Identity Toolkit `accounts:lookup` endpoint using a service bearer
//! credential.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};
use serde::{Deserialize, Serialize};

use super::claims::IdTokenClaims;
use super::jwks::JwksManager;
use super::verifier::{IdentityVerifier, VerifiedIdentity, VerifyError};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Identity Toolkit REST base.
pub const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// HTTP timeout for key set and user record calls.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one Firebase project.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub jwks_url: String,
    pub lookup_url: String,
    /// Bearer credential for `accounts:lookup`
    pub admin_token: Option<String>,
}

impl FirebaseConfig {
    pub fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    local_id: [&'a str; 1],
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<UserRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    #[serde(default)]
    email: Option<String>,
}

/// Verifies Firebase ID tokens for a single project.
pub struct FirebaseVerifier {
    config: FirebaseConfig,
    issuer: String,
    jwks: JwksManager,
    client: reqwest::Client,
}

impl FirebaseVerifier {
    pub fn new(config: FirebaseConfig) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| VerifyError::Upstream(format!("failed to create HTTP client: {e}")))?;
        let jwks = JwksManager::new(config.jwks_url.clone(), client.clone());

        Ok(Self {
            issuer: config.issuer(),
            config,
            jwks,
            client,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    fn lookup_endpoint(&self) -> String {
        format!(
            "{}/projects/{}/accounts:lookup",
            self.config.lookup_url.trim_end_matches('/'),
            self.config.project_id
        )
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> VerifyError {
    match err.kind() {
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::InvalidSignature => VerifyError::InvalidSignature,
        ErrorKind::InvalidIssuer => VerifyError::InvalidClaims("unexpected issuer".into()),
        ErrorKind::InvalidAudience => VerifyError::InvalidClaims("unexpected audience".into()),
        ErrorKind::ImmatureSignature => VerifyError::InvalidClaims("token not yet valid".into()),
        ErrorKind::MissingRequiredClaim(claim) => {
            VerifyError::InvalidClaims(format!("missing claim {claim}"))
        }
        _ => VerifyError::Malformed,
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError> {
        let header = decode_header(token).map_err(|_| VerifyError::Malformed)?;
        let kid = header.kid.ok_or(VerifyError::Malformed)?;
        let (decoding_key, algorithm) = self.jwks.decoding_key(&kid).await?;

        let mut validation = Validation::new(algorithm);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.config.project_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let token_data =
            decode::<IdTokenClaims>(token, &decoding_key, &validation).map_err(map_jwt_error)?;

        token_data.claims.into_identity(unix_now() + CLOCK_SKEW_LEEWAY as i64)
    }

    async fn user_email(&self, external_id: &str) -> Result<String, VerifyError> {
        let mut request = self
            .client
            .post(self.lookup_endpoint())
            .json(&LookupRequest {
                local_id: [external_id],
            });
        if let Some(token) = &self.config.admin_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VerifyError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VerifyError::Upstream(format!(
                "HTTP {} from accounts:lookup",
                response.status()
            )));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| VerifyError::Upstream(e.to_string()))?;

        let user = body
            .users
            .into_iter()
            .next()
            .ok_or_else(|| VerifyError::UserNotFound(external_id.to_string()))?;

        Ok(user.email.unwrap_or_default())
    }

    async fn is_ready(&self) -> bool {
        self.jwks.is_cached().await || self.jwks.refresh().await.is_ok()
    }
}
