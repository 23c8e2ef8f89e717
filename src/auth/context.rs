// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request context discriminator.

use axum::http::HeaderMap;
use serde::Serialize;
use utoipa::ToSchema;

/// Header selecting which user population a request belongs to.
pub const REQUEST_CONTEXT_HEADER: &str = "RequestContext";

/// Header value that switches a request to the back-office population.
pub const BACKOFFICE_CONTEXT: &str = "Backoffice";

/// Which population (and which identity project) a request is resolved against.
///
/// The two are mutually exclusive per request: a back-office request never
/// touches the consumer table and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestContext {
    /// Consumer-facing request (header omitted or any other value).
    #[default]
    Consumer,
    /// Back-office request (`RequestContext: Backoffice`).
    Backoffice,
}

impl RequestContext {
    /// Read the context from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match headers
            .get(REQUEST_CONTEXT_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(value) if value.trim() == BACKOFFICE_CONTEXT => RequestContext::Backoffice,
            _ => RequestContext::Consumer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestContext::Consumer => "consumer",
            RequestContext::Backoffice => "backoffice",
        }
    }
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
