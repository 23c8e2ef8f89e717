// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request authentication state.
//!
//! Created by stage 1, filled in by stage 2, read by handlers, guards and the
//! request span. Lives in the request extensions and is dropped with the
//! request.

use tracing::Span;

use super::context::RequestContext;
use super::principal::Principal;

/// How far the pipeline got for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStage {
    #[default]
    Unauthenticated,
    IdentityResolved,
    PrincipalResolved,
}

/// Identity output of stage 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub external_id: String,
    /// Only known when the token was verified on this request; a token cache
    /// hit carries no email.
    pub email: Option<String>,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RequestAuthState {
    pub context: RequestContext,
    pub stage: AuthStage,
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub consumer_id: Option<u64>,
    pub is_guest: Option<bool>,
    pub backoffice_id: Option<u64>,
    pub is_admin: Option<bool>,
}

impl RequestAuthState {
    /// State after a successful stage 1.
    pub fn identified(context: RequestContext, identity: ResolvedIdentity) -> Self {
        Self {
            context,
            stage: AuthStage::IdentityResolved,
            external_id: Some(identity.external_id),
            email: identity.email,
            ..Self::default()
        }
    }

    /// Record a found principal and mark stage 2 complete.
    ///
    /// Only the slot matching the principal's variant is written, so at most
    /// one of consumer/back-office is ever populated.
    pub fn apply_principal(&mut self, principal: Principal) {
        match principal {
            Principal::Consumer(p) => {
                self.consumer_id = Some(p.id);
                self.is_guest = Some(p.is_guest);
            }
            Principal::Backoffice(p) => {
                self.backoffice_id = Some(p.id);
                self.is_admin = Some(p.is_admin);
            }
        }
        self.stage = AuthStage::PrincipalResolved;
    }

    /// Authenticated consumer id, 0 if none.
    pub fn authenticated_consumer_id(&self) -> u64 {
        self.consumer_id.unwrap_or(0)
    }

    /// Authenticated back-office user id, 0 if none.
    pub fn authenticated_backoffice_id(&self) -> u64 {
        self.backoffice_id.unwrap_or(0)
    }

    /// Admin flag, false if never set.
    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false)
    }

    /// Guest flag, true if never set.
    pub fn is_guest(&self) -> bool {
        self.is_guest.unwrap_or(true)
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Copy what is known so far onto the request span.
    pub fn record(&self, span: &Span) {
        span.record("context", self.context.as_str());
        if let Some(external_id) = &self.external_id {
            span.record("external_id", external_id.as_str());
        }
        if let Some(id) = self.consumer_id {
            span.record("consumer_id", id);
        }
        if let Some(is_guest) = self.is_guest {
            span.record("is_guest", is_guest);
        }
        if let Some(id) = self.backoffice_id {
            span.record("backoffice_id", id);
        }
        if let Some(is_admin) = self.is_admin {
            span.record("is_admin", is_admin);
        }
    }
}
