// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cross-cutting HTTP plumbing: request ids, the request span, response
//! logging and the panic boundary.

use std::any::Any;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{self, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::{
    request_id::{MakeRequestId, RequestId},
    trace::MakeSpan,
};
use tracing::{error, field::Empty, info, info_span, warn, Span};
use uuid::Uuid;

use crate::config::ServiceInfo;
use crate::error::ApiError;
use crate::logging::panic_message;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Paths whose traffic is not logged.
const QUIET_PATH_PREFIXES: [&str; 2] = ["/docs", "/api-doc"];

/// Generates 8 hex character request ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortRequestId;

impl MakeRequestId for ShortRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().simple().to_string();
        HeaderValue::from_str(&id[..8]).ok().map(RequestId::new)
    }
}

/// Builds the `http_request` span. Auth fields start empty and are recorded
/// by the auth middleware as each stage completes.
#[derive(Debug, Clone)]
pub struct RequestSpan {
    service: ServiceInfo,
}

impl RequestSpan {
    pub fn new(service: ServiceInfo) -> Self {
        Self { service }
    }
}

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        info_span!(
            "http_request",
            service = %self.service.name,
            env = %self.service.environment,
            request_id,
            method = %request.method(),
            uri = %request.uri(),
            context = Empty,
            external_id = Empty,
            consumer_id = Empty,
            backoffice_id = Empty,
            is_guest = Empty,
            is_admin = Empty,
        )
    }
}

fn is_quiet_path(path: &str) -> bool {
    QUIET_PATH_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Log the start of every request and its outcome, leveled by status.
pub async fn log_responses(request: Request, next: Next) -> Response {
    if is_quiet_path(request.uri().path()) {
        return next.run(request).await;
    }

    info!("start handling request");
    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis() as u64;

    match status {
        402.. => error!(status, latency_ms, "request failed"),
        400 | 401 => warn!(status, latency_ms, "request rejected"),
        _ => info!(status, latency_ms, "request completed"),
    }
    response
}

/// Response for a panicking handler. The panic itself is logged by the
/// process panic hook.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    ApiError::internal(format!("got panic: {}", panic_message(payload.as_ref()))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn request_ids_are_eight_hex_chars() {
        let request = http::Request::builder().body(()).unwrap();
        let mut maker = ShortRequestId;

        let first = maker.make_request_id(&request).unwrap();
        let second = maker.make_request_id(&request).unwrap();
        let first = first.header_value().to_str().unwrap();

        assert_eq!(first.len(), 8);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second.header_value().to_str().unwrap());
    }

    #[test]
    fn docs_paths_are_quiet() {
        assert!(is_quiet_path("/docs/index.html"));
        assert!(is_quiet_path("/api-doc/openapi.json"));
        assert!(!is_quiet_path("/v1/me"));
    }

    #[tokio::test]
    async fn panic_becomes_internal_error() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "got panic: boom");
    }
}
