// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the request's auth state.
//!
//! The middleware in `middleware.rs` does the work; these only read what it
//! left in the request extensions:
//!
//! ```rust,ignore
//! async fn me(Auth(auth): Auth) -> Json<MeResponse> {
//!     // auth.authenticated_consumer_id(), auth.is_admin(), ...
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::error;

use super::error::AuthError;
use super::pipeline::AuthPipeline;
use super::request_state::RequestAuthState;

/// Auth state of a request that passed stage 1.
///
/// Rejects with [`AuthError::MissingToken`] when the request never went
/// through the `authenticate` middleware.
pub struct Auth(pub RequestAuthState);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestAuthState>()
            .cloned()
            .map(Auth)
            .ok_or(AuthError::MissingToken)
    }
}

/// Extractor that requires a resolved admin principal.
pub struct AdminOnly(pub RequestAuthState);

impl<S> FromRequestParts<S> for AdminOnly
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(auth) = Auth::from_request_parts(parts, state).await?;
        AuthPipeline::check_admin(Some(&auth))?;
        Ok(AdminOnly(auth))
    }
}

/// Allow admins, or the consumer that owns `consumer_id`.
pub fn ensure_owner_or_admin(auth: &RequestAuthState, consumer_id: u64) -> Result<(), AuthError> {
    if auth.is_admin() {
        return Ok(());
    }

    let authenticated = auth.authenticated_consumer_id();
    if authenticated == 0 || authenticated != consumer_id {
        error!(
            authenticated_consumer_id = authenticated,
            requested_consumer_id = consumer_id,
            "consumer does not own resource"
        );
        return Err(AuthError::NotOwner);
    }
    Ok(())
}
