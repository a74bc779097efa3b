//! Similarity search collaborator.
//!
//! The vector index stores passages with embeddings and answers
//! nearest-neighbour queries. Hits carry a fixed optional-field metadata
//! record rather than a free-form map.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single passage returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Passage text
    pub text: String,

    /// Cosine similarity to the query vector, 0.0–1.0
    pub score: f32,

    /// Identifying label of the source document (filename, URL, ...)
    pub source: String,

    /// Optional bounded metadata carried by the index payload
    #[serde(default)]
    pub metadata: HitMetadata,
}

/// Bounded metadata attached to an indexed passage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitMetadata {
    /// Precomputed content hash, preferred over hashing the text for dedup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Human-readable document title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Document kind (e.g. "specification", "faq", "policy")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,

    /// Position of the passage within its source document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
}

impl SearchHit {
    pub fn new(text: impl Into<String>, score: f32, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score,
            source: source.into(),
            metadata: HitMetadata::default(),
        }
    }
}

/// The similarity-search collaborator.
///
/// Results are ordered by descending score and truncated to `limit`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The backend name (e.g., "memory", "qdrant").
    fn name(&self) -> &str;

    /// Return the `limit` passages nearest to `vector`.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>, ProviderError>;
}
