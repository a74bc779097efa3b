//! Pipeline counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct PipelineStats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    rate_limited: AtomicU64,
    invalid_input: AtomicU64,
    context_used: AtomicU64,
    context_failures: AtomicU64,
    completions: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub rate_limited: u64,
    pub invalid_input: u64,
    pub context_used: u64,
    /// Retrievals that failed and fell back to answering without context.
    pub context_failures: u64,
    pub completions: u64,
    pub failures: u64,
}

impl StatsSnapshot {
    /// Fraction of requests answered from the response cache.
    pub fn cache_hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.requests as f64
        }
    }
}

impl PipelineStats {
    pub(crate) fn request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalid_input(&self) {
        self.invalid_input.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn context_used(&self) {
        self.context_used.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn context_failure(&self) {
        self.context_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn completion(&self) {
        self.completions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            invalid_input: self.invalid_input.load(Ordering::Relaxed),
            context_used: self.context_used.load(Ordering::Relaxed),
            context_failures: self.context_failures.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
