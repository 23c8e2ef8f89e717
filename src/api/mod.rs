// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{
        middleware::{authenticate, require_admin, require_principal},
        RequestContext,
    },
    error::ErrorBody,
    middleware::{handle_panic, log_responses, RequestSpan, ShortRequestId, REQUEST_ID_HEADER},
    state::AppState,
};

pub mod admin;
pub mod health;
pub mod users;

/// Build the service router.
///
/// `/v1/identity` needs stage 1 only; `/v1/me` and `/v1/consumers/*` also
/// resolve a principal; `/v1/admin/*` additionally pass the admin guard.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    router_with(state, request_timeout, Router::new())
}

/// Like [`router`], with `extra` routes mounted at the root. They sit behind
/// stage 1 authentication and the full layer stack (request ids, tracing,
/// panic recovery, timeout).
pub fn router_with(
    state: AppState,
    request_timeout: Duration,
    extra: Router<AppState>,
) -> Router {
    let pipeline = state.auth.clone();

    let principal_routes = Router::new()
        .route("/me", get(users::me))
        .route("/consumers/{consumer_id}", get(users::consumer_access))
        .route_layer(middleware::from_fn_with_state(
            pipeline.clone(),
            require_principal,
        ));

    let admin_routes = Router::new()
        .route("/admin/whoami", get(admin::whoami))
        .route(
            "/admin/caches/principals",
            delete(admin::purge_principal_cache),
        )
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(
            pipeline.clone(),
            require_principal,
        ));

    let v1_routes = Router::new()
        .route("/identity", get(users::identity))
        .merge(principal_routes)
        .merge(admin_routes);

    Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .merge(extra)
        .with_state(state.clone())
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(pipeline, authenticate))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, ShortRequestId))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(RequestSpan::new(state.service.clone())),
                )
                .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
                .layer(middleware::from_fn(log_responses))
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                ))
                .layer(CorsLayer::permissive()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        users::identity,
        users::me,
        users::consumer_access,
        admin::whoami,
        admin::purge_principal_cache
    ),
    components(
        schemas(
            ErrorBody,
            RequestContext,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            users::IdentityResponse,
            users::MeResponse,
            users::ConsumerAccessResponse,
            admin::WhoAmIResponse,
            admin::PurgeResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Users", description = "Identity and principal resolution"),
        (name = "Admin", description = "Back-office administration")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health/live",
            "/health/ready",
            "/v1/identity",
            "/v1/me",
            "/v1/consumers/{consumer_id}",
            "/v1/admin/whoami",
            "/v1/admin/caches/principals",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn openapi_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
