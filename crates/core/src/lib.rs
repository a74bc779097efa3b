//! # ragpipe core
//!
//! Domain types, collaborator traits, and error definitions for the ragpipe
//! request pipeline. Every external collaborator (completion provider,
//! embedder, similarity index) is a trait here; implementations live in
//! their own crates so the pipeline can be exercised against mocks.

pub mod error;
pub mod fingerprint;
pub mod message;
pub mod provider;
pub mod search;

// Re-export key types at crate root for ergonomics
pub use error::{BatchError, Error, ProviderError, Result};
pub use fingerprint::{fingerprint, fingerprint_str};
pub use message::{Message, Role};
pub use provider::{Embedder, Provider, ProviderRequest, ProviderResponse};
pub use search::{HitMetadata, SearchHit, VectorIndex};
