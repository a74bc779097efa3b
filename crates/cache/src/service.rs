//! Cache instances per value class, plus opportunistic cleanup.
//!
//! There is no dedicated sweeper task: each response-cache access checks
//! whether `cleanup_interval` has elapsed since the last sweep and, if so,
//! sweeps all three caches inline.

use crate::expiring::ExpiringCache;
use ragpipe_config::CacheConfig;
use ragpipe_core::SearchHit;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Normalize a user query for response caching: lowercase, whitespace collapsed.
pub fn normalize_query(query: &str) -> String {
    query
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The three caches used by the pipeline.
///
/// `R` is the cached chat response type. Embeddings are keyed by the exact
/// text embedded; documents by the retrieval variant that produced them.
pub struct CacheService<R> {
    pub responses: Arc<ExpiringCache<R>>,
    pub embeddings: Arc<ExpiringCache<Vec<f32>>>,
    pub documents: Arc<ExpiringCache<Vec<SearchHit>>>,
    cleanup_interval: Duration,
    last_cleanup: Mutex<Instant>,
}

impl<R: Clone> CacheService<R> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            responses: Arc::new(ExpiringCache::new(
                "responses",
                config.response.max_entries,
                Duration::from_secs(config.response.ttl_secs),
            )),
            embeddings: Arc::new(ExpiringCache::new(
                "embeddings",
                config.embedding.max_entries,
                Duration::from_secs(config.embedding.ttl_secs),
            )),
            documents: Arc::new(ExpiringCache::new(
                "documents",
                config.document.max_entries,
                Duration::from_secs(config.document.ttl_secs),
            )),
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
            last_cleanup: Mutex::new(Instant::now()),
        }
    }

    /// Cached response for `query`, matched on its normalized form.
    pub async fn get_response(&self, query: &str) -> Option<R> {
        let hit = self.responses.get(&normalize_query(query)).await;
        self.check_cleanup().await;
        hit
    }

    /// Cache `response` under the normalized `query` with the default TTL.
    pub async fn put_response(&self, query: &str, response: R) {
        self.responses.insert(&normalize_query(query), response).await;
        self.check_cleanup().await;
    }

    /// Sweep all caches if the cleanup interval has elapsed. Returns the
    /// number of entries removed (0 when no sweep was due).
    pub async fn check_cleanup(&self) -> usize {
        let now = Instant::now();
        {
            let mut last = self.last_cleanup.lock().unwrap_or_else(|e| e.into_inner());
            if now.duration_since(*last) < self.cleanup_interval {
                return 0;
            }
            *last = now;
        }

        let removed = self.responses.cleanup().await
            + self.embeddings.cleanup().await
            + self.documents.cleanup().await;
        debug!(removed, "Cache cleanup completed");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragpipe_config::CacheTierConfig;

    fn config() -> CacheConfig {
        CacheConfig {
            cleanup_interval_secs: 300,
            response: CacheTierConfig {
                max_entries: 2,
                ttl_secs: 60,
            },
            embedding: CacheTierConfig {
                max_entries: 10,
                ttl_secs: 600,
            },
            document: CacheTierConfig {
                max_entries: 10,
                ttl_secs: 600,
            },
        }
    }

    #[test]
    fn normalization_folds_case_and_whitespace() {
        assert_eq!(
            normalize_query("  What is   your\tReturn Policy? "),
            "what is your return policy?"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn equivalent_queries_share_a_response() {
        let caches: CacheService<String> = CacheService::new(&config());
        caches.put_response("What is your return policy?", "30 days".into()).await;

        let hit = caches.get_response("what is  YOUR return policy?").await;
        assert_eq!(hit.as_deref(), Some("30 days"));
    }

    #[tokio::test(start_paused = true)]
    async fn caches_have_independent_capacity() {
        let caches: CacheService<String> = CacheService::new(&config());
        for i in 0..5 {
            caches.put_response(&format!("q{i}"), "r".into()).await;
            caches.embeddings.insert(&format!("t{i}"), vec![i as f32]).await;
        }

        assert_eq!(caches.responses.len().await, 2);
        assert_eq!(caches.embeddings.len().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_runs_only_after_interval() {
        let caches: CacheService<String> = CacheService::new(&config());
        caches.put_response("q", "r".into()).await;

        tokio::time::advance(Duration::from_secs(120)).await;
        // Entry expired, but no sweep is due yet.
        assert_eq!(caches.check_cleanup().await, 0);
        assert_eq!(caches.responses.len().await, 1);

        tokio::time::advance(Duration::from_secs(200)).await;
        assert_eq!(caches.check_cleanup().await, 1);
        assert_eq!(caches.responses.len().await, 0);
    }
}
