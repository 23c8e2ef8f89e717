// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity and principal endpoints.

use axum::{extract::Path, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{ensure_owner_or_admin, Auth, AuthError, RequestAuthState, RequestContext};
use crate::error::ErrorBody;

/// Response for GET /v1/identity
#[derive(Debug, Serialize, ToSchema)]
pub struct IdentityResponse {
    /// Identity provider user id
    pub external_id: String,
    /// Only present when the token was verified on this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub context: RequestContext,
}

/// Response for GET /v1/me
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub context: RequestContext,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_guest: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoffice_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
}

impl From<RequestAuthState> for MeResponse {
    fn from(auth: RequestAuthState) -> Self {
        Self {
            context: auth.context,
            external_id: auth.external_id.unwrap_or_default(),
            consumer_id: auth.consumer_id,
            is_guest: auth.is_guest,
            backoffice_id: auth.backoffice_id,
            is_admin: auth.is_admin,
        }
    }
}

/// Response for GET /v1/consumers/{consumer_id}
#[derive(Debug, Serialize, ToSchema)]
pub struct ConsumerAccessResponse {
    pub consumer_id: u64,
    /// "owner" or "admin"
    pub granted_by: String,
}

/// Identity of the bearer token, without resolving a principal.
#[utoipa::path(
    get,
    path = "/v1/identity",
    tag = "Users",
    security(("bearer" = [])),
    params(
        ("RequestContext" = Option<String>, Header, description = "`Backoffice` for back-office users")
    ),
    responses(
        (status = 200, description = "Verified identity", body = IdentityResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
    )
)]
pub async fn identity(Auth(auth): Auth) -> Json<IdentityResponse> {
    Json(IdentityResponse {
        external_id: auth.external_id.unwrap_or_default(),
        email: auth.email,
        context: auth.context,
    })
}

/// The principal behind the bearer token.
#[utoipa::path(
    get,
    path = "/v1/me",
    tag = "Users",
    security(("bearer" = [])),
    params(
        ("RequestContext" = Option<String>, Header, description = "`Backoffice` for back-office users")
    ),
    responses(
        (status = 200, description = "Resolved principal", body = MeResponse),
        (status = 401, description = "Unauthenticated or unknown user", body = ErrorBody),
        (status = 500, description = "Identity or principal lookup failed", body = ErrorBody),
    )
)]
pub async fn me(Auth(auth): Auth) -> Json<MeResponse> {
    Json(auth.into())
}

/// Access check on a consumer resource: the owning consumer or an admin.
#[utoipa::path(
    get,
    path = "/v1/consumers/{consumer_id}",
    tag = "Users",
    security(("bearer" = [])),
    params(
        ("consumer_id" = u64, Path, description = "Consumer id"),
        ("RequestContext" = Option<String>, Header, description = "`Backoffice` for back-office users")
    ),
    responses(
        (status = 200, description = "Access granted", body = ConsumerAccessResponse),
        (status = 401, description = "Not the owner", body = ErrorBody),
    )
)]
pub async fn consumer_access(
    Auth(auth): Auth,
    Path(consumer_id): Path<u64>,
) -> Result<Json<ConsumerAccessResponse>, AuthError> {
    ensure_owner_or_admin(&auth, consumer_id)?;

    let granted_by = if auth.is_admin() { "admin" } else { "owner" };
    Ok(Json(ConsumerAccessResponse {
        consumer_id,
        granted_by: granted_by.to_string(),
    }))
}
