//! Provider implementations and batching for ragpipe.
//!
//! `OpenAiCompatProvider` implements `ragpipe_core::Provider` over HTTP.
//! `BatchAggregator` is the generic coalescing primitive; `BatchedEmbedder`
//! puts it, plus the embedding cache, in front of `Provider::embed`.

pub mod batch;
pub mod embedder;
pub mod openai_compat;

pub use batch::{BatchAggregator, BatchStats};
pub use embedder::BatchedEmbedder;
pub use openai_compat::OpenAiCompatProvider;
