// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Internal principals resolved from an external identity.

use serde::Serialize;
use utoipa::ToSchema;

use super::context::RequestContext;

/// A consumer row. `id == 0` records that no consumer exists for the email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ConsumerPrincipal {
    pub id: u64,
    pub is_guest: bool,
}

impl ConsumerPrincipal {
    /// Negative result: no consumer for this identity.
    pub fn not_found() -> Self {
        Self {
            id: 0,
            is_guest: true,
        }
    }
}

/// A back-office (trader) row. `id == 0` records that no such user exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct BackofficePrincipal {
    pub id: u64,
    pub is_admin: bool,
}

impl BackofficePrincipal {
    /// Negative result: no back-office user for this identity.
    pub fn not_found() -> Self {
        Self {
            id: 0,
            is_admin: false,
        }
    }
}

/// Principal resolved for a request; the variant always matches the
/// request's [`RequestContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Principal {
    Consumer(ConsumerPrincipal),
    Backoffice(BackofficePrincipal),
}

impl Principal {
    /// Negative result for the given context.
    pub fn not_found(context: RequestContext) -> Self {
        match context {
            RequestContext::Consumer => Principal::Consumer(ConsumerPrincipal::not_found()),
            RequestContext::Backoffice => Principal::Backoffice(BackofficePrincipal::not_found()),
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Principal::Consumer(p) => p.id,
            Principal::Backoffice(p) => p.id,
        }
    }

    /// Whether a row was actually found (`id != 0`).
    pub fn is_found(&self) -> bool {
        self.id() != 0
    }

    pub fn context(&self) -> RequestContext {
        match self {
            Principal::Consumer(_) => RequestContext::Consumer,
            Principal::Backoffice(_) => RequestContext::Backoffice,
        }
    }
}
