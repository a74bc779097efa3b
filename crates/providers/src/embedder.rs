//! Query embedding through the embedding cache and a batch aggregator.

use crate::batch::{BatchAggregator, BatchStats};
use async_trait::async_trait;
use ragpipe_cache::ExpiringCache;
use ragpipe_config::{BatchConfig, ProviderConfig};
use ragpipe_core::provider::EmbeddingRequest;
use ragpipe_core::{Embedder, Provider, ProviderError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct EmbeddingKey<'a> {
    model: &'a str,
    text: &'a str,
}

/// An [`Embedder`] that coalesces concurrent queries into batched
/// `Provider::embed` calls and remembers results in an expiring cache.
pub struct BatchedEmbedder {
    model: String,
    aggregator: BatchAggregator<String, Vec<f32>>,
    cache: Option<Arc<ExpiringCache<Vec<f32>>>>,
}

impl BatchedEmbedder {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        batch_size: usize,
        max_wait: Duration,
    ) -> Self {
        let model = model.into();
        let batch_model = model.clone();

        let aggregator = BatchAggregator::new(batch_size, max_wait, move |inputs: Vec<String>| {
            let provider = provider.clone();
            let request = EmbeddingRequest {
                model: batch_model.clone(),
                inputs,
            };
            async move { Ok(provider.embed(request).await?.embeddings) }
        });

        Self {
            model,
            aggregator,
            cache: None,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, provider_config: &ProviderConfig, batch: &BatchConfig) -> Self {
        Self::new(
            provider,
            &provider_config.embedding_model,
            batch.embedding_batch_size,
            Duration::from_millis(batch.embedding_max_wait_ms),
        )
    }

    /// Serve repeated queries from `cache` and store fresh embeddings in it.
    pub fn with_cache(mut self, cache: Arc<ExpiringCache<Vec<f32>>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn batch_stats(&self) -> BatchStats {
        self.aggregator.stats()
    }
}

#[async_trait]
impl Embedder for BatchedEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let key = EmbeddingKey {
            model: &self.model,
            text,
        };

        if let Some(cache) = &self.cache
            && let Some(vector) = cache.get(&key).await
        {
            debug!(model = %self.model, "Embedding cache hit");
            return Ok(vector);
        }

        let vector = self.aggregator.submit(text.to_string()).await?;

        if let Some(cache) = &self.cache {
            cache.insert(&key, vector.clone()).await;
        }
        Ok(vector)
    }
}
