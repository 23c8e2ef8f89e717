// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

/// Terminal failures of the authentication pipeline.
///
/// Every variant aborts the request; nothing is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No bearer token on the request
    #[error("Authentication Error - No id token found for this request")]
    MissingToken,

    /// Identity provider rejected the token (expired, malformed, bad signature)
    #[error("Authentication Error - Token not verified, err: {0}")]
    InvalidToken(String),

    /// Identity provider failed to return the user record
    #[error("Authentication Error - User record not found: {0}")]
    IdentityLookupFailed(String),

    /// No consumer/back-office row for the identity's email
    #[error("Authentication Error. User not found.")]
    PrincipalNotFound,

    /// Principal store query failed
    #[error("Authentication Error - Principal lookup failed: {0}")]
    PrincipalLookupFailed(String),

    /// Admin guard rejected the request
    #[error("Authentication Error. No sufficient permissions.")]
    InsufficientPermissions,

    /// Authenticated consumer does not own the requested resource
    #[error("Unauthenticated")]
    NotOwner,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::IdentityLookupFailed(_) => "identity_lookup_failed",
            AuthError::PrincipalNotFound => "principal_not_found",
            AuthError::PrincipalLookupFailed(_) => "principal_lookup_failed",
            AuthError::InsufficientPermissions => "insufficient_permissions",
            AuthError::NotOwner => "not_owner",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken
            | AuthError::InvalidToken(_)
            | AuthError::PrincipalNotFound
            | AuthError::InsufficientPermissions
            | AuthError::NotOwner => StatusCode::UNAUTHORIZED,
            AuthError::IdentityLookupFailed(_) | AuthError::PrincipalLookupFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::new(err.status_code(), err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
