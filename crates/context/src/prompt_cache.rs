//! Prompt-level cache of rendered context, keyed by a fingerprint of the
//! static prefix plus the user id.
//!
//! Expiry is lazy: an entry is valid while `now < expires_at`, and reading
//! an expired entry evicts it and counts as a miss.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Length of a cache key in hex chars.
pub const CACHE_KEY_LEN: usize = 32;

/// One cached rendering.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheEntry {
    pub cache_key: String,
    pub rendered_text: String,
    pub static_prefix_fingerprint: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Hit/miss counters since process start.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
    pub entries: usize,
}

#[derive(Default)]
pub struct PromptCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PromptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic key for `(static_prefix, user_id)`.
    ///
    /// Each input is hashed with its byte length in front, so no two
    /// different pairs share an encoding.
    pub fn key(static_prefix: &str, user_id: &str) -> String {
        let mut hasher = Sha256::new();
        for part in [static_prefix, user_id] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let mut key = hex::encode(hasher.finalize());
        key.truncate(CACHE_KEY_LEN);
        key
    }

    /// Short fingerprint of a static prefix.
    pub fn fingerprint(static_prefix: &str) -> String {
        let mut fp = hex::encode(Sha256::digest(static_prefix.as_bytes()));
        fp.truncate(16);
        fp
    }

    /// The cached text for `key`, if present and not expired.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let live = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .get(key)
                .map(|e| e.is_live(now).then(|| e.rendered_text.clone()))
        };

        match live {
            Some(Some(text)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(text)
            }
            Some(None) => {
                let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
                // Re-check: a concurrent put may have refreshed it.
                if entries.get(key).is_some_and(|e| !e.is_live(now)) {
                    entries.remove(key);
                    debug!(cache_key = %key, "Evicted expired prompt");
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `text` under `key` for `ttl`, replacing any previous entry.
    /// A zero TTL stores nothing and returns `false`.
    pub fn put(
        &self,
        key: &str,
        text: &str,
        static_prefix: &str,
        user_id: &str,
        ttl: Duration,
    ) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let created_at = Utc::now();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| created_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let entry = CacheEntry {
            cache_key: key.to_string(),
            rendered_text: text.to_string(),
            static_prefix_fingerprint: Self::fingerprint(static_prefix),
            user_id: user_id.to_string(),
            created_at,
            expires_at,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
        debug!(cache_key = %key, user_id = %user_id, ttl_secs = ttl.as_secs(), "Cached prompt");
        true
    }

    pub fn stats(&self) -> CacheStats {
        let hit_count = self.hits.load(Ordering::Relaxed);
        let miss_count = self.misses.load(Ordering::Relaxed);
        let total = hit_count + miss_count;
        CacheStats {
            hit_count,
            miss_count,
            hit_rate: if total == 0 {
                0.0
            } else {
                hit_count as f64 / total as f64
            },
            entries: self.entries.read().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }

    /// Drop every entry; returns how many were removed. Counters are kept.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let n = entries.len();
        entries.clear();
        n
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Drop every entry belonging to `user_id`.
    pub fn invalidate_user(&self, user_id: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.user_id != user_id);
        before - entries.len()
    }

    /// Evict all expired entries now.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}
