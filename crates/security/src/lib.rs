//! Admission control for ragpipe.
//!
//! Provides:
//! - **Rate limiting**: per-caller sliding 60-second window
//! - **Input screening**: length limits and injection-pattern rejection

pub mod input;
pub mod rate_limit;

pub use input::{InputCheckResult, InputValidator};
pub use rate_limit::RateLimiter;
