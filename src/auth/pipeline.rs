// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication resolution pipeline.
//!
//! ```text
//! Unauthenticated --stage 1--> IdentityResolved --stage 2--> PrincipalResolved
//!        |                            |                              |
//!        +--------> Rejected <--------+                         Authorized
//! ```
//!
//! Stage 1 turns a bearer token into an external identity (token cache, then
//! identity verifier). Stage 2 turns the identity into an internal principal
//! (principal cache, then principal store). Caches are written only after the
//! upstream call has fully succeeded, so a cancelled request never leaves a
//! partial entry behind. Concurrent misses for the same key may both reach
//! the upstream; the writes carry the same value and the last one wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::context::RequestContext;
use super::error::AuthError;
use super::principal::Principal;
use super::principal_cache::PrincipalCache;
use super::request_state::{AuthStage, RequestAuthState, ResolvedIdentity};
use super::resolver::PrincipalResolver;
use super::token_cache::TokenCache;
use super::verifier::IdentityVerifier;

/// Default deadline for a single verifier or store call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Cache sizing and lifetimes.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub token_ttl: Duration,
    pub token_capacity: usize,
    pub principal_ttl: Duration,
    pub principal_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            token_ttl: super::token_cache::DEFAULT_TOKEN_TTL,
            token_capacity: 100_000,
            principal_ttl: Duration::from_secs(20 * 60),
            principal_capacity: 100_000,
        }
    }
}

/// All caches used by the pipeline.
///
/// Constructed once at process start and handed to [`AuthPipeline::new`];
/// there is no global instance.
pub struct AuthCaches {
    consumer_tokens: TokenCache,
    backoffice_tokens: TokenCache,
    principals: PrincipalCache,
}

impl AuthCaches {
    pub fn initialize(settings: &CacheSettings) -> Self {
        Self {
            consumer_tokens: TokenCache::new(settings.token_capacity, settings.token_ttl),
            backoffice_tokens: TokenCache::new(settings.token_capacity, settings.token_ttl),
            principals: PrincipalCache::new(settings.principal_capacity, settings.principal_ttl),
        }
    }

    /// Token cache for the identity project serving `context`.
    pub fn tokens(&self, context: RequestContext) -> &TokenCache {
        match context {
            RequestContext::Consumer => &self.consumer_tokens,
            RequestContext::Backoffice => &self.backoffice_tokens,
        }
    }

    pub fn principals(&self) -> &PrincipalCache {
        &self.principals
    }
}

/// Identity verifiers, one per user population.
#[derive(Clone)]
pub struct Verifiers {
    pub consumer: Arc<dyn IdentityVerifier>,
    pub backoffice: Arc<dyn IdentityVerifier>,
}

impl Verifiers {
    pub fn new(consumer: Arc<dyn IdentityVerifier>, backoffice: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            consumer,
            backoffice,
        }
    }

    pub fn for_context(&self, context: RequestContext) -> &Arc<dyn IdentityVerifier> {
        match context {
            RequestContext::Consumer => &self.consumer,
            RequestContext::Backoffice => &self.backoffice,
        }
    }
}

/// Readiness of the pipeline's upstream collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamHealth {
    pub identity: bool,
    pub store: bool,
}

pub struct AuthPipeline {
    caches: AuthCaches,
    verifiers: Verifiers,
    resolver: PrincipalResolver,
    upstream_timeout: Duration,
    public_paths: Vec<String>,
}

impl AuthPipeline {
    pub fn new(caches: AuthCaches, verifiers: Verifiers, resolver: PrincipalResolver) -> Self {
        Self {
            caches,
            verifiers,
            resolver,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            public_paths: Vec::new(),
        }
    }

    /// Deadline applied to each verifier and store call.
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Path prefixes that bypass the pipeline entirely. A prefix matches
    /// whole segments only: `/health` covers `/health/live`, not
    /// `/healthcheck`.
    pub fn with_public_paths(mut self, paths: Vec<String>) -> Self {
        self.public_paths = paths;
        self
    }

    pub fn caches(&self) -> &AuthCaches {
        &self.caches
    }

    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            match path.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            }
        })
    }

    /// Stage 1: verify the token and build the request's auth state.
    pub async fn authenticate(
        &self,
        context: RequestContext,
        token: &str,
    ) -> Result<RequestAuthState, AuthError> {
        let identity = self.resolve_identity(context, token).await?;
        Ok(RequestAuthState::identified(context, identity))
    }

    /// Token -> external identity, through the token cache.
    pub async fn resolve_identity(
        &self,
        context: RequestContext,
        token: &str,
    ) -> Result<ResolvedIdentity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let tokens = self.caches.tokens(context);
        if let Some(external_id) = tokens.get(token) {
            debug!(%context, external_id = %external_id, "found token in cache");
            return Ok(ResolvedIdentity {
                external_id,
                email: None,
                cache_hit: true,
            });
        }

        let verifier = self.verifiers.for_context(context);
        let verified = with_deadline(self.upstream_timeout, verifier.verify(token))
            .await
            .ok_or_else(|| AuthError::InvalidToken("identity verification timed out".into()))?
            .map_err(|e| {
                debug!(%context, error = %e, "token rejected by identity provider");
                AuthError::InvalidToken(e.to_string())
            })?;

        tokens.insert(token, &verified.external_id);
        info!(%context, external_id = %verified.external_id, "got token from identity provider");

        Ok(ResolvedIdentity {
            external_id: verified.external_id,
            email: verified.email,
            cache_hit: false,
        })
    }

    /// Stage 2: external identity -> internal principal, through the
    /// principal cache.
    ///
    /// Only the population selected by the request context is consulted.
    /// On success the principal is written into `state`.
    pub async fn resolve_principal(
        &self,
        state: &mut RequestAuthState,
    ) -> Result<Principal, AuthError> {
        let Some(external_id) = state.external_id.clone() else {
            return Err(AuthError::MissingToken);
        };
        let context = state.context;

        let principal = match self.caches.principals().get(&external_id, context) {
            Some(principal) => {
                debug!(%context, %external_id, id = principal.id(), "principal found in cache");
                principal
            }
            None => {
                let email = match state.email.clone() {
                    Some(email) => email,
                    None => {
                        let email = self.lookup_email(context, &external_id).await?;
                        state.email = Some(email.clone());
                        email
                    }
                };

                let principal =
                    with_deadline(self.upstream_timeout, self.resolver.resolve(&email, context))
                        .await
                        .ok_or_else(|| {
                            AuthError::PrincipalLookupFailed("principal lookup timed out".into())
                        })?
                        .map_err(|e| {
                            error!(%context, %external_id, error = %e, "principal lookup failed");
                            AuthError::PrincipalLookupFailed(e.to_string())
                        })?;

                self.caches.principals().put(&external_id, principal);
                info!(
                    %context,
                    %external_id,
                    %email,
                    id = principal.id(),
                    "principal not cached, resolved from store"
                );
                principal
            }
        };

        if !principal.is_found() {
            warn!(%context, %external_id, "no principal for identity");
            return Err(AuthError::PrincipalNotFound);
        }

        state.apply_principal(principal);
        Ok(principal)
    }

    /// Admin guard. Pure read of the request state, no I/O.
    ///
    /// Passes only when stage 2 resolved a back-office principal with the
    /// admin flag set.
    pub fn check_admin(state: Option<&RequestAuthState>) -> Result<(), AuthError> {
        match state {
            Some(state) if state.stage == AuthStage::PrincipalResolved && state.is_admin() => {
                Ok(())
            }
            _ => Err(AuthError::InsufficientPermissions),
        }
    }

    async fn lookup_email(
        &self,
        context: RequestContext,
        external_id: &str,
    ) -> Result<String, AuthError> {
        let verifier = self.verifiers.for_context(context);
        with_deadline(self.upstream_timeout, verifier.user_email(external_id))
            .await
            .ok_or_else(|| AuthError::IdentityLookupFailed("user record lookup timed out".into()))?
            .map_err(|e| {
                error!(%context, %external_id, error = %e, "user record lookup failed");
                AuthError::IdentityLookupFailed(e.to_string())
            })
    }

    /// Probe both identity verifiers and the principal store.
    pub async fn check_upstreams(&self) -> UpstreamHealth {
        let identity = self.verifiers.consumer.is_ready().await
            && self.verifiers.backoffice.is_ready().await;
        let store = match self.resolver.store().ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "principal store ping failed");
                false
            }
        };
        UpstreamHealth { identity, store }
    }
}

/// Run `fut` under a deadline; `None` when it elapsed.
async fn with_deadline<F: Future>(deadline: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(deadline, fut).await.ok()
}
