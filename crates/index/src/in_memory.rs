//! In-memory index, used by tests and as the default backend.

use crate::vector::cosine_similarity;
use async_trait::async_trait;
use ragpipe_core::{ProviderError, SearchHit, VectorIndex};
use tokio::sync::RwLock;

struct IndexedPassage {
    hit: SearchHit,
    embedding: Vec<f32>,
}

/// Brute-force cosine-similarity index over passages held in a `Vec`.
#[derive(Default)]
pub struct InMemoryIndex {
    passages: RwLock<Vec<IndexedPassage>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a passage. The hit's `score` is ignored; it is recomputed per query.
    pub async fn add(&self, hit: SearchHit, embedding: Vec<f32>) {
        self.passages.write().await.push(IndexedPassage { hit, embedding });
    }

    pub async fn len(&self) -> usize {
        self.passages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.passages.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let passages = self.passages.read().await;

        let mut hits: Vec<SearchHit> = passages
            .iter()
            .map(|p| SearchHit {
                score: cosine_similarity(&p.embedding, vector),
                ..p.hit.clone()
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_index_returns_nothing() {
        let index = InMemoryIndex::new();
        assert!(index.search(&[1.0, 0.0], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hits_are_ranked_and_truncated() {
        let index = InMemoryIndex::new();
        index.add(SearchHit::new("orthogonal", 0.0, "a.md"), vec![0.0, 1.0]).await;
        index.add(SearchHit::new("exact", 0.0, "b.md"), vec![1.0, 0.0]).await;
        index.add(SearchHit::new("partial", 0.0, "c.md"), vec![1.0, 1.0]).await;

        let hits = index.search(&[1.0, 0.0], 2).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "exact");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].text, "partial");
        assert_eq!(index.len().await, 3);
    }
}
