// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Three layers, applied from the outside in:
//!
//! - [`authenticate`]: stage 1, on the whole router. Public path prefixes and
//!   CORS preflight requests pass through untouched.
//! - [`require_principal`]: stage 2, as a `route_layer` on routes that need
//!   a consumer or back-office principal.
//! - [`require_admin`]: admin guard, as a `route_layer` inside
//!   `require_principal`.
//!
//! ```rust,ignore
//! let admin = Router::new()
//!     .route("/v1/admin/whoami", get(whoami))
//!     .route_layer(middleware::from_fn(require_admin))
//!     .route_layer(middleware::from_fn_with_state(pipeline.clone(), require_principal));
//!
//! let app = Router::new()
//!     .merge(admin)
//!     .layer(middleware::from_fn_with_state(pipeline, authenticate));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{ACCESS_CONTROL_REQUEST_METHOD, AUTHORIZATION},
        HeaderMap, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn, Span};

use super::context::RequestContext;
use super::error::AuthError;
use super::pipeline::AuthPipeline;
use super::request_state::{AuthStage, RequestAuthState};

/// Bearer token from the `Authorization` header.
///
/// Strips a leading `Bearer` and surrounding whitespace. A missing or
/// non-ASCII header yields an empty token.
pub fn bearer_token(headers: &HeaderMap) -> &str {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            let raw = raw.trim();
            raw.strip_prefix("Bearer").unwrap_or(raw).trim()
        })
        .unwrap_or_default()
}

/// CORS preflight: `OPTIONS` carrying `Access-Control-Request-Method`.
pub fn is_preflight_request(request: &Request) -> bool {
    request.method() == Method::OPTIONS
        && request.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

fn reject(err: AuthError) -> Response {
    let status = err.status_code();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(code = err.error_code(), error = %err, "authentication failed");
    } else if matches!(err, AuthError::MissingToken | AuthError::InvalidToken(_)) {
        debug!(code = err.error_code(), error = %err, "request rejected");
    } else {
        warn!(code = err.error_code(), error = %err, "request rejected");
    }
    err.into_response()
}

/// Stage 1: resolve the bearer token to an external identity.
///
/// On success a [`RequestAuthState`] is inserted into the request extensions
/// and its fields are recorded on the current span.
pub async fn authenticate(
    State(pipeline): State<Arc<AuthPipeline>>,
    mut request: Request,
    next: Next,
) -> Response {
    if pipeline.is_public_path(request.uri().path()) || is_preflight_request(&request) {
        return next.run(request).await;
    }

    let context = RequestContext::from_headers(request.headers());
    let token = bearer_token(request.headers()).to_owned();

    match pipeline.authenticate(context, &token).await {
        Ok(state) => {
            state.record(&Span::current());
            request.extensions_mut().insert(state);
            next.run(request).await
        }
        Err(err) => reject(err),
    }
}

/// Stage 2: resolve the identity to a principal.
///
/// Requires [`authenticate`] to have run; a request without auth state is
/// rejected as unauthenticated.
pub async fn require_principal(
    State(pipeline): State<Arc<AuthPipeline>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(state) = request.extensions_mut().get_mut::<RequestAuthState>() else {
        return reject(AuthError::MissingToken);
    };

    if state.stage != AuthStage::PrincipalResolved {
        let resolved = pipeline.resolve_principal(state).await;
        state.record(&Span::current());
        if let Err(err) = resolved {
            return reject(err);
        }
    }

    next.run(request).await
}

/// Admin guard. Reads the request's auth state, performs no I/O.
pub async fn require_admin(request: Request, next: Next) -> Response {
    if let Err(err) = AuthPipeline::check_admin(request.extensions().get::<RequestAuthState>()) {
        return reject(err);
    }
    next.run(request).await
}
