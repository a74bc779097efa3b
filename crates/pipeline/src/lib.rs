//! # ragpipe pipeline
//!
//! The request façade that composes admission control, input screening,
//! the response cache, context assembly, prompt construction, completion,
//! and confidence scoring into a single `handle` call, and tallies answered
//! messages by topic.

pub mod analysis;
pub mod chat;
pub mod confidence;
pub mod history;
pub mod prompt;
mod session;
pub mod stats;

pub use analysis::{CategoryCount, GlobalAnalysis, InteractionLog, SessionAnalysis, UNKNOWN_CATEGORY};
pub use chat::{ChatPipeline, ChatResponse, InboundMessage};
pub use confidence::{confidence, needs_human};
pub use history::HistoryStore;
pub use prompt::{BuiltPrompt, PromptBuilder};
pub use stats::{PipelineStats, StatsSnapshot};
