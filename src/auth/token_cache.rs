// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token cache: bearer token -> external identity id.
//!
//! Entries are keyed by the literal token string, so two tokens for the same
//! user are cached independently. Expiry is measured from the write; a hit
//! does not extend the entry's lifetime.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;

/// Default token lifetime in the cache (20 minutes).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(20 * 60);

struct CacheEntry {
    external_id: String,
    inserted_at: Instant,
}

/// In-process cache of verified tokens.
pub struct TokenCache {
    cache: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl TokenCache {
    /// Create a cache holding at most `capacity` tokens for `ttl` each.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up the external id for a token.
    ///
    /// Returns `None` if the token was never cached or its entry is at least
    /// `ttl` old; expired entries are dropped on the way out.
    pub fn get(&self, token: &str) -> Option<String> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = cache.get(token) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Some(entry.external_id.clone());
            }
            cache.pop(token);
        }
        None
    }

    /// Store a verified token, resetting its expiry.
    pub fn insert(&self, token: &str, external_id: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(
            token.to_string(),
            CacheEntry {
                external_id: external_id.to_string(),
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
