//! Similarity-search backends implementing `ragpipe_core::VectorIndex`.

pub mod in_memory;
pub mod qdrant;
pub mod vector;

pub use in_memory::InMemoryIndex;
pub use qdrant::QdrantIndex;
pub use vector::cosine_similarity;

use ragpipe_config::IndexConfig;
use ragpipe_core::{ProviderError, VectorIndex};
use std::sync::Arc;

/// Build the backend named by `config.backend`.
pub fn from_config(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>, ProviderError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new())),
        "qdrant" => Ok(Arc::new(QdrantIndex::from_config(config)?)),
        other => Err(ProviderError::NotConfigured(format!(
            "unknown index backend '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_selection() {
        let memory = from_config(&IndexConfig::default()).unwrap();
        assert_eq!(memory.name(), "memory");

        let qdrant = IndexConfig {
            backend: "qdrant".into(),
            url: Some("http://localhost:6333".into()),
            ..IndexConfig::default()
        };
        assert_eq!(from_config(&qdrant).unwrap().name(), "qdrant");

        let unknown = IndexConfig {
            backend: "faiss".into(),
            ..IndexConfig::default()
        };
        assert!(from_config(&unknown).is_err());
    }
}
