//! Context assembly for ragpipe.
//!
//! Expands a query into variants, retrieves candidates from the similarity
//! index, deduplicates and ranks them, reorders for source diversity, and
//! packs them under a token budget.

pub mod assembler;
pub mod budget;
pub mod expand;
pub mod rank;
pub mod token;

pub use assembler::{AssembledContext, AssemblerSettings, ContextAssembler};
pub use budget::{ContextBudget, PackReport, Packer, SEPARATOR, TRUNCATION_MARKER};
pub use expand::QueryExpander;
pub use rank::{CandidateDocument, Ranker};
pub use token::{CharRatioEstimator, TokenEstimator, truncate_chars};
