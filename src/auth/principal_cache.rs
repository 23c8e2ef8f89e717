// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Principal cache: external identity id -> resolved principal.
//!
//! Consumers and back-office users live in separate namespaces. Negative
//! results (`id == 0`) are cached like any other entry so unknown emails do
//! not hit the store on every request. Every entry expires `ttl` after it
//! was written.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

use super::context::RequestContext;
use super::principal::Principal;

struct CacheEntry {
    principal: Principal,
    inserted_at: Instant,
}

struct Namespace {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl Namespace {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get(&self, external_id: &str, ttl: Duration) -> Option<Principal> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(external_id) {
            if entry.inserted_at.elapsed() < ttl {
                return Some(entry.principal);
            }
            entries.pop(external_id);
        }
        None
    }

    fn put(&self, external_id: &str, principal: Principal) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(
            external_id.to_string(),
            CacheEntry {
                principal,
                inserted_at: Instant::now(),
            },
        );
    }

    fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        count
    }

    fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Shared cache of resolved principals, one namespace per [`RequestContext`].
pub struct PrincipalCache {
    consumers: Namespace,
    backoffice: Namespace,
    ttl: Duration,
}

impl PrincipalCache {
    /// Create a cache holding up to `capacity` entries per namespace.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            consumers: Namespace::new(capacity),
            backoffice: Namespace::new(capacity),
            ttl,
        }
    }

    fn namespace(&self, context: RequestContext) -> &Namespace {
        match context {
            RequestContext::Consumer => &self.consumers,
            RequestContext::Backoffice => &self.backoffice,
        }
    }

    /// Cached principal for an identity in the given context, if fresh.
    pub fn get(&self, external_id: &str, context: RequestContext) -> Option<Principal> {
        self.namespace(context).get(external_id, self.ttl)
    }

    /// Cache a principal; the namespace is taken from the principal's variant.
    pub fn put(&self, external_id: &str, principal: Principal) {
        self.namespace(principal.context()).put(external_id, principal);
    }

    /// Drop every entry in both namespaces, returning how many were removed.
    pub fn clear(&self) -> usize {
        self.consumers.clear() + self.backoffice.clear()
    }

    pub fn len(&self, context: RequestContext) -> usize {
        self.namespace(context).len()
    }
}
