//! Context assembly: `EXPAND → RETRIEVE → DEDUPE_RANK → PACK`.
//!
//! The original query and every expansion variant are embedded and searched
//! concurrently. A failing expansion variant is logged and skipped; a failure
//! on the original query is returned to the caller. "No context" is
//! `Ok(None)`, never an error.

use crate::budget::{ContextBudget, PackReport, Packer};
use crate::expand::QueryExpander;
use crate::rank::{Ranker, dedupe, diversify};
use crate::token::{CharRatioEstimator, TokenEstimator};
use futures::future::join_all;
use ragpipe_cache::ExpiringCache;
use ragpipe_config::ContextConfig;
use ragpipe_core::{Embedder, ProviderError, SearchHit, VectorIndex};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// Tunables for one assembler instance.
#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    pub similarity_threshold: f32,
    pub high_relevance_threshold: f32,
    /// Hits requested from the index per variant.
    pub top_k: usize,
    pub max_expansions: usize,
    pub truncation_buffer_tokens: usize,
}

impl From<&ContextConfig> for AssemblerSettings {
    fn from(config: &ContextConfig) -> Self {
        Self {
            similarity_threshold: config.similarity_threshold,
            high_relevance_threshold: config.high_relevance_threshold,
            top_k: config.top_k,
            max_expansions: config.max_expansions,
            truncation_buffer_tokens: config.truncation_buffer_tokens,
        }
    }
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

/// Packed context ready for the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Parts joined with the visible separator.
    pub text: String,
    pub consumed_tokens: usize,
    pub max_tokens: usize,
    pub documents_used: usize,
    /// Whether the last part was cut to fit.
    pub truncated: bool,
    /// Distinct sources in packing order.
    pub sources: Vec<String>,
}

#[derive(Serialize)]
struct DocumentKey<'a> {
    variant: &'a str,
    top_k: usize,
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    expander: QueryExpander,
    ranker: Ranker,
    estimator: Arc<dyn TokenEstimator>,
    settings: AssemblerSettings,
    documents: Option<Arc<ExpiringCache<Vec<SearchHit>>>>,
}

impl ContextAssembler {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, settings: AssemblerSettings) -> Self {
        Self {
            embedder,
            index,
            expander: QueryExpander::new(settings.max_expansions),
            ranker: Ranker::new(settings.similarity_threshold),
            estimator: Arc::new(CharRatioEstimator::default()),
            settings,
            documents: None,
        }
    }

    pub fn from_config(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: &ContextConfig) -> Self {
        Self::new(embedder, index, AssemblerSettings::from(config))
            .with_estimator(Arc::new(CharRatioEstimator::new(config.chars_per_token)))
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Remember search results per variant in `cache`.
    pub fn with_document_cache(mut self, cache: Arc<ExpiringCache<Vec<SearchHit>>>) -> Self {
        self.documents = Some(cache);
        self
    }

    /// Assemble context for `query` within `max_tokens`.
    pub async fn get_context(
        &self,
        query: &str,
        max_tokens: usize,
    ) -> Result<Option<AssembledContext>, ProviderError> {
        // EXPAND
        let expansions = self.expander.expand(query);
        let variants: Vec<&str> = std::iter::once(query)
            .chain(expansions.iter().map(String::as_str))
            .collect();

        // RETRIEVE
        let mut results = join_all(variants.iter().map(|p| self.retrieve(p))).await.into_iter();
        let mut hits = match results.next() {
            Some(Ok(hits)) => hits,
            Some(Err(e)) => return Err(e),
            None => Vec::new(),
        };
        for (variant, result) in variants.iter().skip(1).zip(results) {
            match result {
                Ok(more) => hits.extend(more),
                Err(e) => warn!(variant = %variant, error = %e, "Expansion variant failed, skipping"),
            }
        }

        // DEDUPE_RANK
        let retrieved = hits.len();
        let ranked = diversify(self.ranker.rank(query, dedupe(hits)));
        debug!(
            variants = variants.len(),
            retrieved,
            eligible = ranked.len(),
            "Candidates ranked"
        );
        if ranked.is_empty() {
            return Ok(None);
        }

        // PACK
        let mut budget = ContextBudget::new(max_tokens);
        let packer = Packer {
            estimator: self.estimator.as_ref(),
            high_relevance_threshold: self.settings.high_relevance_threshold,
            truncation_buffer_tokens: self.settings.truncation_buffer_tokens,
        };
        let PackReport {
            documents_used,
            truncated,
            sources,
        } = packer.pack(&ranked, &mut budget);

        if budget.is_empty() {
            return Ok(None);
        }

        info!(
            documents_used,
            consumed_tokens = budget.consumed_tokens(),
            max_tokens,
            truncated,
            "Context assembled"
        );

        Ok(Some(AssembledContext {
            text: budget.join(),
            consumed_tokens: budget.consumed_tokens(),
            max_tokens,
            documents_used,
            truncated,
            sources,
        }))
    }

    async fn retrieve(&self, variant: &str) -> Result<Vec<SearchHit>, ProviderError> {
        let key = DocumentKey {
            variant,
            top_k: self.settings.top_k,
        };

        if let Some(cache) = &self.documents
            && let Some(hits) = cache.get(&key).await
        {
            return Ok(hits);
        }

        let vector = self.embedder.embed_query(variant).await?;
        let hits = self.index.search(&vector, self.settings.top_k).await?;

        if let Some(cache) = &self.documents {
            cache.insert(&key, hits.clone()).await;
        }
        Ok(hits)
    }
}
