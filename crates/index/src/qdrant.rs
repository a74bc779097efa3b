//! Qdrant REST search client.
//!
//! Issues `POST {url}/collections/{collection}/points/search` and maps each
//! scored point's payload (`text`, `source`, and the optional
//! `content_hash`, `title`, `doc_type`, `chunk_index`) onto a `SearchHit`.

use async_trait::async_trait;
use ragpipe_config::IndexConfig;
use ragpipe_core::{HitMetadata, ProviderError, SearchHit, VectorIndex};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct QdrantIndex {
    base_url: String,
    collection: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantIndex {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            api_key,
            client,
        })
    }

    pub fn from_config(config: &IndexConfig) -> Result<Self, ProviderError> {
        let url = config.url.clone().ok_or_else(|| {
            ProviderError::NotConfigured("index.url is required for the qdrant backend".into())
        })?;
        Self::new(url, &config.collection, config.api_key.clone())
    }

    fn search_url(&self) -> String {
        format!("{}/collections/{}/points/search", self.base_url, self.collection)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let body = serde_json::json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });

        let mut request = self.client.post(self.search_url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::SearchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), collection = %self.collection, "Qdrant search failed");
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message,
            });
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("qdrant search body: {e}")))?;

        let hits: Vec<SearchHit> = parsed.result.into_iter().filter_map(ScoredPoint::into_hit).collect();
        debug!(collection = %self.collection, hits = hits.len(), "Qdrant search completed");
        Ok(hits)
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Debug, Deserialize)]
struct PointPayload {
    text: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    content_hash: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    doc_type: Option<String>,
    #[serde(default)]
    chunk_index: Option<usize>,
}

impl ScoredPoint {
    /// Points without a text payload carry nothing to retrieve.
    fn into_hit(self) -> Option<SearchHit> {
        let payload = self.payload?;
        let text = payload.text?;
        Some(SearchHit {
            text,
            score: self.score,
            source: payload.source.unwrap_or_else(|| "unknown".into()),
            metadata: HitMetadata {
                content_hash: payload.content_hash,
                title: payload.title,
                doc_type: payload.doc_type,
                chunk_index: payload.chunk_index,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_is_built_from_collection() {
        let index = QdrantIndex::new("http://localhost:6333/", "Fred", None).unwrap();
        assert_eq!(
            index.search_url(),
            "http://localhost:6333/collections/Fred/points/search"
        );
    }

    #[test]
    fn from_config_requires_url() {
        assert!(QdrantIndex::from_config(&IndexConfig::default()).is_err());
    }

    #[test]
    fn parse_search_response() {
        let data = r#"{
            "result": [
                {"id": 1, "version": 3, "score": 0.91, "payload": {
                    "text": "Items can be returned within 30 days.",
                    "source": "returns.pdf",
                    "title": "Return policy",
                    "chunk_index": 2
                }},
                {"id": 2, "version": 3, "score": 0.55, "payload": {"source": "empty.pdf"}},
                {"id": 3, "version": 3, "score": 0.40}
            ],
            "status": "ok",
            "time": 0.002
        }"#;
        let parsed: SearchResponse = serde_json::from_str(data).unwrap();
        let hits: Vec<SearchHit> = parsed.result.into_iter().filter_map(ScoredPoint::into_hit).collect();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "returns.pdf");
        assert_eq!(hits[0].metadata.title.as_deref(), Some("Return policy"));
        assert_eq!(hits[0].metadata.chunk_index, Some(2));
        assert!(hits[0].metadata.content_hash.is_none());
    }
}
