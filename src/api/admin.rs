// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints.
//!
//! Routed behind `require_principal` and `require_admin`; the handlers also
//! take [`AdminOnly`] so they cannot be mounted without the guard by mistake.

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::{auth::AdminOnly, error::ErrorBody, state::AppState};

/// Response for GET /v1/admin/whoami
#[derive(Debug, Serialize, ToSchema)]
pub struct WhoAmIResponse {
    pub backoffice_id: u64,
    pub external_id: String,
    pub is_admin: bool,
}

/// Response for DELETE /v1/admin/caches/principals
#[derive(Debug, Serialize, ToSchema)]
pub struct PurgeResponse {
    /// Number of cached principals dropped, across both namespaces.
    pub purged: usize,
}

/// The admin behind the bearer token.
#[utoipa::path(
    get,
    path = "/v1/admin/whoami",
    tag = "Admin",
    security(("bearer" = [])),
    params(
        ("RequestContext" = String, Header, description = "Must be `Backoffice`")
    ),
    responses(
        (status = 200, description = "Admin principal", body = WhoAmIResponse),
        (status = 401, description = "Not an admin", body = ErrorBody),
    )
)]
pub async fn whoami(AdminOnly(auth): AdminOnly) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        backoffice_id: auth.authenticated_backoffice_id(),
        external_id: auth.external_id.unwrap_or_default(),
        is_admin: true,
    })
}

/// Drop every cached principal, e.g. after changing a user's role.
#[utoipa::path(
    delete,
    path = "/v1/admin/caches/principals",
    tag = "Admin",
    security(("bearer" = [])),
    params(
        ("RequestContext" = String, Header, description = "Must be `Backoffice`")
    ),
    responses(
        (status = 200, description = "Principal cache cleared", body = PurgeResponse),
        (status = 401, description = "Not an admin", body = ErrorBody),
    )
)]
pub async fn purge_principal_cache(
    AdminOnly(auth): AdminOnly,
    State(state): State<AppState>,
) -> Json<PurgeResponse> {
    let purged = state.auth.caches().principals().clear();
    info!(
        backoffice_id = auth.authenticated_backoffice_id(),
        purged, "principal cache purged"
    );
    Json(PurgeResponse { purged })
}
