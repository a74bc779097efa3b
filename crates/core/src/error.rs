//! Error types for the ragpipe domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; `Error` ties them together
//! for the pipeline façade.

use thiserror::Error;

/// The top-level error type for all ragpipe operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Admission ---
    #[error("Rate limit exceeded for {identity}")]
    RateLimitExceeded { identity: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A failure reported by an external collaborator (completion, embedding or
/// similarity search). `Clone` so a single failure can be handed to every
/// caller waiting on the same batch.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Similarity search failed: {0}")]
    SearchFailed(String),
}

/// Outcome delivered to every waiter of a batch that did not succeed.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    #[error("batch processing failed: {0}")]
    Failed(ProviderError),

    #[error("batch processor returned {got} results for {expected} items")]
    LengthMismatch { expected: usize, got: usize },

    #[error("batch was dropped before it completed")]
    Dropped,
}

impl From<BatchError> for ProviderError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Failed(inner) => inner,
            other => ProviderError::InvalidResponse(other.to_string()),
        }
    }
}
