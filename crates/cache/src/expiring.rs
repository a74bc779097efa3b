//! Generic key → value store with per-entry TTL and LRU eviction.
//!
//! Keys are fingerprints of caller-supplied key data (see
//! `ragpipe_core::fingerprint`). Expiry is checked lazily on `get` and in
//! bulk by `cleanup`. Recency order, maintained by `lru::LruCache`, is the
//! sole basis for eviction; capacity is a hard cap.
//!
//! The map sits behind an async mutex: `cleanup` holds it for the whole
//! sweep, so concurrent `get`/`set` calls wait instead of interleaving.

use lru::LruCache;
use ragpipe_core::fingerprint;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A cached value with its expiry and access count.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
    pub hit_count: u64,
}

/// Fingerprint-keyed LRU cache with per-entry expiry.
pub struct ExpiringCache<V> {
    name: String,
    max_size: usize,
    default_ttl: Duration,
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
}

impl<V: Clone> ExpiringCache<V> {
    /// Create a cache holding at most `max_size` entries.
    pub fn new(name: impl Into<String>, max_size: usize, default_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            max_size: max_size.max(1),
            default_ttl,
            entries: Mutex::new(LruCache::unbounded()),
        }
    }

    /// Look up `key`. A live hit moves to the most-recently-used end and bumps
    /// its hit count; an expired entry is removed and reported as absent.
    pub async fn get<K: Serialize + ?Sized>(&self, key: &K) -> Option<V> {
        let key = self.key_for(key)?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let expired = entries.peek(&key)?.expires_at <= now;
        if expired {
            entries.pop(&key);
            debug!(cache = %self.name, "Expired entry dropped on read");
            return None;
        }

        let entry = entries.get_mut(&key)?;
        entry.hit_count += 1;
        Some(entry.value.clone())
    }

    /// Insert with the cache's default TTL.
    pub async fn insert<K: Serialize + ?Sized>(&self, key: &K, value: V) {
        self.set(key, value, self.default_ttl).await;
    }

    /// Insert or overwrite at the most-recently-used end, then evict from the
    /// least-recently-used end until the cache is back under capacity.
    pub async fn set<K: Serialize + ?Sized>(&self, key: &K, value: V, ttl: Duration) {
        let Some(key) = self.key_for(key) else {
            return;
        };
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
            hit_count: 0,
        };

        let mut entries = self.entries.lock().await;
        entries.put(key, entry);

        let mut evicted = 0usize;
        while entries.len() > self.max_size {
            if entries.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        if evicted > 0 {
            debug!(cache = %self.name, evicted, "Evicted least-recently-used entries");
        }
    }

    /// Remove every entry whose expiry has passed. Returns the number removed.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        if !expired.is_empty() {
            debug!(cache = %self.name, removed = expired.len(), "Expired entries swept");
        }
        expired.len()
    }

    /// Hit count of a live entry, without touching its recency.
    pub async fn hit_count<K: Serialize + ?Sized>(&self, key: &K) -> Option<u64> {
        let key = self.key_for(key)?;
        let entries = self.entries.lock().await;
        entries.peek(&key).map(|e| e.hit_count)
    }

    pub async fn contains<K: Serialize + ?Sized>(&self, key: &K) -> bool {
        match self.key_for(key) {
            Some(key) => self.entries.lock().await.contains(&key),
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    fn key_for<K: Serialize + ?Sized>(&self, key: &K) -> Option<String> {
        match fingerprint(key) {
            Ok(k) => Some(k),
            Err(e) => {
                warn!(cache = %self.name, error = %e, "Unfingerprintable cache key");
                None
            }
        }
    }
}
