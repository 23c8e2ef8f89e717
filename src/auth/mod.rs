// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Turns an inbound bearer token into an authorization decision for
//! consumers and back-office users.
//!
//! ## Auth Flow
//!
//! 1. Client sends `Authorization: Bearer <ID token>` and, for back-office
//!    traffic, `RequestContext: Backoffice`
//! 2. Stage 1 (`authenticate` middleware):
//!    - Token cache lookup, keyed by the literal token
//!    - On miss: verify the ID token against the realm's identity project
//! 3. Stage 2 (`require_principal` middleware, per route):
//!    - Principal cache lookup, keyed by external id
//!    - On miss: email from the token or the user record, then a point
//!      query on the consumer or back-office table
//! 4. Admin routes additionally pass `require_admin`
//!
//! ## Caching
//!
//! - Both caches are LRU bounded with a fixed TTL from the write
//! - Negative principal results (id 0) are cached; failures never are
//! - Caches are built once by [`AuthCaches::initialize`] and owned by the
//!   [`AuthPipeline`]

pub mod claims;
pub mod context;
pub mod error;
pub mod extractor;
pub mod firebase;
pub mod jwks;
pub mod middleware;
pub mod pipeline;
pub mod principal;
pub mod principal_cache;
pub mod request_state;
pub mod resolver;
pub mod token_cache;
pub mod verifier;

pub use context::RequestContext;
pub use error::AuthError;
pub use extractor::{ensure_owner_or_admin, AdminOnly, Auth};
pub use firebase::{FirebaseConfig, FirebaseVerifier};
pub use jwks::JwksManager;
pub use pipeline::{AuthCaches, AuthPipeline, CacheSettings, UpstreamHealth, Verifiers};
pub use principal::{BackofficePrincipal, ConsumerPrincipal, Principal};
pub use principal_cache::PrincipalCache;
pub use request_state::{AuthStage, RequestAuthState, ResolvedIdentity};
pub use resolver::{PrincipalResolver, PrincipalRow, PrincipalStore, PrincipalTable, StoreError};
pub use token_cache::TokenCache;
pub use verifier::{IdentityVerifier, VerifiedIdentity, VerifyError};
