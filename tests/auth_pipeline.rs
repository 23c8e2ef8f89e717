// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end tests of the authentication pipeline through the HTTP router.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    routing::get as get_route,
    Router,
};
use backend_common::{
    api::{router, router_with},
    auth::{
        AuthCaches, AuthPipeline, CacheSettings, IdentityVerifier, PrincipalResolver,
        PrincipalRow, PrincipalStore, PrincipalTable, RequestContext, StoreError,
        VerifiedIdentity, VerifyError, Verifiers,
    },
    config::ServiceInfo,
    state::AppState,
    store::InMemoryPrincipalStore,
};
use serde_json::Value;
use tokio::sync::Barrier;
use tower::ServiceExt;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPSTREAM_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Default)]
struct MockVerifier {
    tokens: HashMap<String, VerifiedIdentity>,
    emails: HashMap<String, String>,
    /// Token whose verification waits until two verifications are in flight
    rendezvous: Option<(String, Arc<Barrier>)>,
    /// `verify` never completes
    stalled: bool,
    /// `user_email` fails as if the identity provider were down
    user_records_down: bool,
    verify_calls: AtomicUsize,
    email_calls: AtomicUsize,
}

impl MockVerifier {
    fn with_token(mut self, token: &str, external_id: &str, email: &str) -> Self {
        self.tokens.insert(
            token.to_string(),
            VerifiedIdentity {
                external_id: external_id.to_string(),
                email: Some(email.to_string()),
            },
        );
        self.emails.insert(external_id.to_string(), email.to_string());
        self
    }

    fn with_rendezvous(mut self, token: &str) -> Self {
        self.rendezvous = Some((token.to_string(), Arc::new(Barrier::new(2))));
        self
    }

    fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for MockVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, VerifyError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if let Some((rendezvous_token, barrier)) = &self.rendezvous {
            if rendezvous_token == token {
                barrier.wait().await;
            }
        }
        self.tokens.get(token).cloned().ok_or(VerifyError::Expired)
    }

    async fn user_email(&self, external_id: &str) -> Result<String, VerifyError> {
        self.email_calls.fetch_add(1, Ordering::SeqCst);
        if self.user_records_down {
            return Err(VerifyError::Upstream("down".to_string()));
        }
        self.emails
            .get(external_id)
            .cloned()
            .ok_or_else(|| VerifyError::UserNotFound(external_id.to_string()))
    }
}

/// Principal store that records which tables were queried.
#[derive(Default)]
struct RecordingStore {
    inner: InMemoryPrincipalStore,
    queried: Mutex<Vec<String>>,
}

impl RecordingStore {
    fn lookups(&self) -> usize {
        self.queried.lock().unwrap().len()
    }

    fn queried_tables(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl PrincipalStore for RecordingStore {
    async fn find_by_email(
        &self,
        table: &PrincipalTable,
        email: &str,
    ) -> Result<Option<PrincipalRow>, StoreError> {
        self.queried.lock().unwrap().push(table.qualified_name());
        self.inner.find_by_email(table, email).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct TestApp {
    app: Router,
    state: AppState,
    consumer: Arc<MockVerifier>,
    backoffice: Arc<MockVerifier>,
    store: Arc<RecordingStore>,
}

fn consumer_verifier() -> MockVerifier {
    MockVerifier::default()
        .with_token("tok-1", "ext-42", "a@example.com")
        .with_token("tok-1b", "ext-42", "a@example.com")
        .with_token("tok-3", "ext-404", "ghost@example.com")
        .with_token("tok-4", "ext-99", "c@example.com")
        .with_token("tok-5", "ext-5", "e@example.com")
        .with_rendezvous("tok-4")
}

async fn test_app() -> TestApp {
    test_app_with(consumer_verifier(), REQUEST_TIMEOUT, Router::new()).await
}

/// Test app with a custom consumer verifier, request timeout and extra
/// routes. Upstream calls get a short deadline.
async fn test_app_with(
    consumer: MockVerifier,
    request_timeout: Duration,
    extra: Router<AppState>,
) -> TestApp {
    let consumer = Arc::new(consumer);
    let backoffice = Arc::new(
        MockVerifier::default()
            .with_token("bo-admin", "ext-ops", "ops@example.com")
            .with_token("bo-staff", "ext-staff", "staff@example.com")
            .with_token("tok-1", "ext-bo-1", "a@example.com"),
    );

    let store = Arc::new(RecordingStore::default());
    let consumers = PrincipalTable::consumers();
    let traders = PrincipalTable::traders();
    store.inner.insert(&consumers, "a@example.com", 7, false).await;
    store.inner.insert(&consumers, "c@example.com", 9, true).await;
    store.inner.insert(&consumers, "e@example.com", 5, false).await;
    store.inner.insert(&traders, "ops@example.com", 3, true).await;
    store.inner.insert(&traders, "staff@example.com", 4, false).await;

    let pipeline = AuthPipeline::new(
        AuthCaches::initialize(&CacheSettings::default()),
        Verifiers::new(consumer.clone(), backoffice.clone()),
        PrincipalResolver::new(store.clone()),
    )
    .with_upstream_timeout(UPSTREAM_TIMEOUT)
    .with_public_paths(vec![
        "/health".to_string(),
        "/docs".to_string(),
        "/api-doc".to_string(),
    ]);

    let state = AppState::new(
        pipeline,
        ServiceInfo {
            name: "backend-common".to_string(),
            environment: "test".to_string(),
        },
    );

    TestApp {
        app: router_with(state.clone(), request_timeout, extra),
        state,
        consumer,
        backoffice,
        store,
    }
}

fn get(uri: &str, token: Option<&str>, backoffice: bool) -> Request<Body> {
    request(Method::GET, uri, token, backoffice)
}

fn request(method: Method, uri: &str, token: Option<&str>, backoffice: bool) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    if backoffice {
        builder = builder.header("RequestContext", "Backoffice");
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn consumer_principal_is_resolved() {
    let t = test_app().await;

    let (status, body) = send(&t.app, get("/v1/me", Some("tok-1"), false)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["context"], "consumer");
    assert_eq!(body["external_id"], "ext-42");
    assert_eq!(body["consumer_id"], 7);
    assert_eq!(body["is_guest"], false);
    assert!(body.get("backoffice_id").is_none());
}

#[tokio::test]
async fn rejected_token_is_unauthorized() {
    let t = test_app().await;

    let (status, body) = send(&t.app, get("/v1/me", Some("tok-2"), false)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("Token not verified"), "{message}");
    assert!(t.state.auth.caches().tokens(RequestContext::Consumer).is_empty());
}

#[tokio::test]
async fn missing_token_is_rejected_without_io() {
    let t = test_app().await;

    for request in [
        get("/v1/identity", None, false),
        Request::builder()
            .uri("/v1/identity")
            .header("Authorization", "Bearer   ")
            .body(Body::empty())
            .unwrap(),
    ] {
        let (status, body) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"],
            "Authentication Error - No id token found for this request"
        );
    }
    assert_eq!(t.consumer.verify_calls(), 0);
}

#[tokio::test]
async fn unknown_user_is_unauthorized_and_negatively_cached() {
    let t = test_app().await;

    for _ in 0..2 {
        let (status, body) = send(&t.app, get("/v1/me", Some("tok-3"), false)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication Error. User not found.");
    }

    assert_eq!(t.store.lookups(), 1);
    let cached = t
        .state
        .auth
        .caches()
        .principals()
        .get("ext-404", RequestContext::Consumer)
        .unwrap();
    assert_eq!(cached.id(), 0);
}

#[tokio::test]
async fn backoffice_admin_passes_admin_guard() {
    let t = test_app().await;

    let (status, body) = send(&t.app, get("/v1/admin/whoami", Some("bo-admin"), true)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backoffice_id"], 3);
    assert_eq!(body["external_id"], "ext-ops");
    assert_eq!(t.store.queried_tables(), vec!["traders.traders"]);
    assert_eq!(t.consumer.verify_calls(), 0);
}

#[tokio::test]
async fn consumer_request_never_touches_backoffice() {
    let t = test_app().await;

    let (status, body) = send(&t.app, get("/v1/me", Some("tok-1"), false)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consumer_id"], 7);
    assert_eq!(t.store.queried_tables(), vec!["consumers.consumers"]);
    assert_eq!(t.backoffice.verify_calls(), 0);
    assert_eq!(
        t.state.auth.caches().principals().len(RequestContext::Backoffice),
        0
    );
}

#[tokio::test]
async fn backoffice_context_uses_backoffice_realm() {
    let t = test_app().await;

    // Same token string, different identity project.
    let (status, body) = send(&t.app, get("/v1/identity", Some("tok-1"), true)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["external_id"], "ext-bo-1");
    assert_eq!(body["context"], "backoffice");
    assert_eq!(t.consumer.verify_calls(), 0);
    assert_eq!(t.backoffice.verify_calls(), 1);
}

#[tokio::test]
async fn concurrent_misses_both_verify_and_agree() {
    let t = test_app().await;

    let (first, second) = tokio::join!(
        send(&t.app, get("/v1/identity", Some("tok-4"), false)),
        send(&t.app, get("/v1/identity", Some("tok-4"), false)),
    );

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert_eq!(first.1["external_id"], "ext-99");
    assert_eq!(second.1["external_id"], "ext-99");
    assert_eq!(t.consumer.verify_calls(), 2);

    let tokens = t.state.auth.caches().tokens(RequestContext::Consumer);
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens.get("tok-4").as_deref(), Some("ext-99"));
}

#[tokio::test]
async fn cached_token_skips_verifier() {
    let t = test_app().await;

    let (_, first) = send(&t.app, get("/v1/identity", Some("tok-1"), false)).await;
    let (status, second) = send(&t.app, get("/v1/identity", Some("tok-1"), false)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["external_id"], second["external_id"]);
    assert_eq!(first["email"], "a@example.com");
    // A cache hit carries no email.
    assert!(second.get("email").is_none());
    assert_eq!(t.consumer.verify_calls(), 1);
}

#[tokio::test]
async fn distinct_tokens_for_one_identity_are_cached_separately() {
    let t = test_app().await;

    send(&t.app, get("/v1/identity", Some("tok-1"), false)).await;
    send(&t.app, get("/v1/identity", Some("tok-1b"), false)).await;

    assert_eq!(t.consumer.verify_calls(), 2);
    assert_eq!(
        t.state.auth.caches().tokens(RequestContext::Consumer).len(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn token_cache_entry_expires_at_ttl() {
    let t = test_app().await;
    let ttl = CacheSettings::default().token_ttl;

    send(&t.app, get("/v1/identity", Some("tok-1"), false)).await;
    tokio::time::advance(ttl - Duration::from_secs(1)).await;
    send(&t.app, get("/v1/identity", Some("tok-1"), false)).await;
    assert_eq!(t.consumer.verify_calls(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    let (status, _) = send(&t.app, get("/v1/identity", Some("tok-1"), false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(t.consumer.verify_calls(), 2);
}

#[tokio::test]
async fn cached_identity_fetches_email_from_user_record() {
    let t = test_app().await;

    // Stage 1 only: token cached, no principal yet.
    send(&t.app, get("/v1/identity", Some("tok-5"), false)).await;
    let (status, body) = send(&t.app, get("/v1/me", Some("tok-5"), false)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["consumer_id"], 5);
    assert_eq!(t.consumer.email_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn admin_guard_rejects_non_admins() {
    let t = test_app().await;

    let cases = [
        get("/v1/admin/whoami", Some("bo-staff"), true),
        get("/v1/admin/whoami", Some("tok-1"), false),
    ];
    for request in cases {
        let (status, body) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body["error"],
            "Authentication Error. No sufficient permissions."
        );
    }

    let (status, _) = send(&t.app, get("/v1/admin/whoami", None, true)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn consumer_resources_are_owner_or_admin_only() {
    let t = test_app().await;

    let (status, body) = send(&t.app, get("/v1/consumers/7", Some("tok-1"), false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granted_by"], "owner");

    let (status, body) = send(&t.app, get("/v1/consumers/8", Some("tok-1"), false)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthenticated");

    let (status, body) = send(&t.app, get("/v1/consumers/8", Some("bo-admin"), true)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granted_by"], "admin");
}

#[tokio::test]
async fn admin_can_purge_principal_cache() {
    let t = test_app().await;

    send(&t.app, get("/v1/me", Some("tok-1"), false)).await;
    assert_eq!(
        t.state.auth.caches().principals().len(RequestContext::Consumer),
        1
    );

    let (status, body) = send(
        &t.app,
        request(
            Method::DELETE,
            "/v1/admin/caches/principals",
            Some("bo-admin"),
            true,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    // The admin's own principal was cached by this request before the purge.
    assert_eq!(body["purged"], 2);
    assert_eq!(
        t.state.auth.caches().principals().len(RequestContext::Consumer),
        0
    );
}

#[tokio::test]
async fn public_paths_skip_authentication() {
    let t = test_app().await;

    let (status, body) = send(&t.app, get("/health/live", None, false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&t.app, get("/health/ready", None, false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["store"], "ok");

    let (status, _) = send(&t.app, get("/api-doc/openapi.json", None, false)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn cors_preflight_skips_authentication() {
    let t = test_app().await;

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/me")
        .header("Origin", "https://app.example.com")
        .header("Access-Control-Request-Method", "GET")
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(t.consumer.verify_calls(), 0);
}

#[tokio::test]
async fn responses_carry_short_request_id() {
    let t = test_app().await;

    let response = t
        .app
        .clone()
        .oneshot(get("/health/live", None, false))
        .await
        .unwrap();
    let id = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(id.len(), 8);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .header("x-request-id", "caller-id")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "caller-id");
}

#[tokio::test]
async fn plain_router_serves_health() {
    let t = test_app().await;
    let app = router(t.state.clone(), REQUEST_TIMEOUT);

    let (status, _) = send(&app, get("/health/live", None, false)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn stalled_verifier_is_unauthorized_and_uncached() {
    let consumer = MockVerifier {
        stalled: true,
        ..consumer_verifier()
    };
    let t = test_app_with(consumer, REQUEST_TIMEOUT, Router::new()).await;

    let (status, body) = send(&t.app, get("/v1/me", Some("tok-1"), false)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("timed out"), "{message}");
    assert!(t.state.auth.caches().tokens(RequestContext::Consumer).is_empty());
    assert_eq!(t.store.lookups(), 0);
}

#[tokio::test]
async fn user_record_failure_after_token_cache_hit_is_server_error() {
    let consumer = MockVerifier {
        user_records_down: true,
        ..consumer_verifier()
    };
    let t = test_app_with(consumer, REQUEST_TIMEOUT, Router::new()).await;

    // Stage 1 only: the token is cached but carries no email afterwards.
    let (status, _) = send(&t.app, get("/v1/identity", Some("tok-1"), false)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&t.app, get("/v1/me", Some("tok-1"), false)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["error"],
        "Authentication Error - User record not found: identity provider error: down"
    );
    assert_eq!(t.consumer.email_calls.load(Ordering::SeqCst), 1);
    assert_eq!(t.store.lookups(), 0);
    assert_eq!(
        t.state.auth.caches().principals().len(RequestContext::Consumer),
        0
    );
}

async fn explode() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn handler_panic_becomes_internal_error() {
    let extra = Router::new().route("/v1/explode", get_route(explode));
    let t = test_app_with(consumer_verifier(), REQUEST_TIMEOUT, extra).await;

    let response = t
        .app
        .clone()
        .oneshot(get("/v1/explode", Some("tok-1"), false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let id = response.headers()["x-request-id"].to_str().unwrap().to_owned();
    assert_eq!(id.len(), 8);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "got panic: handler exploded");
}

async fn dawdle() -> &'static str {
    tokio::time::sleep(Duration::from_secs(60)).await;
    "done"
}

#[tokio::test(start_paused = true)]
async fn slow_handler_hits_request_timeout() {
    let extra = Router::new().route("/v1/dawdle", get_route(dawdle));
    let t = test_app_with(consumer_verifier(), Duration::from_secs(1), extra).await;

    let response = t
        .app
        .clone()
        .oneshot(get("/v1/dawdle", Some("tok-1"), false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(response.headers().contains_key("x-request-id"));
}
