//! Packing ranked candidates under a hard token budget.

use crate::rank::CandidateDocument;
use crate::token::{TokenEstimator, truncate_chars};

/// Visible separator between packed parts. Its cost counts against the budget.
pub const SEPARATOR: &str = "\n\n---\n\n";

/// Appended to a candidate that was cut to fit.
pub const TRUNCATION_MARKER: &str = " [...truncated]";

/// Fraction of the budget below which a high-relevance candidate may be
/// truncated instead of skipped.
const TRUNCATE_BELOW_FRACTION: f64 = 0.8;

/// Accumulates context parts; `consumed_tokens` never exceeds `max_tokens`.
#[derive(Debug, Clone)]
pub struct ContextBudget {
    max_tokens: usize,
    consumed_tokens: usize,
    parts: Vec<String>,
}

impl ContextBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            consumed_tokens: 0,
            parts: Vec::new(),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn consumed_tokens(&self) -> usize {
        self.consumed_tokens
    }

    pub fn remaining(&self) -> usize {
        self.max_tokens - self.consumed_tokens
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Append `text` if `cost` fits; returns whether it was appended.
    pub fn try_push(&mut self, text: String, cost: usize) -> bool {
        if cost > self.remaining() {
            return false;
        }
        self.consumed_tokens += cost;
        self.parts.push(text);
        true
    }

    pub fn join(&self) -> String {
        self.parts.join(SEPARATOR)
    }
}

/// What the packer did with the candidate list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackReport {
    pub documents_used: usize,
    pub truncated: bool,
    pub sources: Vec<String>,
}

/// Walks candidates in order and fills a [`ContextBudget`].
pub struct Packer<'a> {
    pub estimator: &'a dyn TokenEstimator,
    /// Candidates scoring above this may be truncated to fit.
    pub high_relevance_threshold: f32,
    /// Tokens left unused when truncating.
    pub truncation_buffer_tokens: usize,
}

impl Packer<'_> {
    /// Pack `candidates` in order. Stops at the first candidate that does not
    /// fit, after truncating it if it is highly relevant and the budget is
    /// not yet mostly consumed.
    pub fn pack(&self, candidates: &[CandidateDocument], budget: &mut ContextBudget) -> PackReport {
        let mut report = PackReport::default();
        let separator_cost = self.estimator.estimate(SEPARATOR);

        for candidate in candidates {
            let joint = if budget.is_empty() { 0 } else { separator_cost };
            let cost = self.estimator.estimate(&candidate.text) + joint;

            if budget.try_push(candidate.text.clone(), cost) {
                report.record(candidate);
                continue;
            }

            if self.may_truncate(candidate, budget)
                && let Some((piece, piece_cost)) = self.truncated_piece(candidate, budget.remaining(), joint)
                && budget.try_push(piece, piece_cost)
            {
                report.record(candidate);
                report.truncated = true;
            }
            break;
        }

        report
    }

    fn may_truncate(&self, candidate: &CandidateDocument, budget: &ContextBudget) -> bool {
        let mostly_consumed =
            budget.consumed_tokens() as f64 >= budget.max_tokens() as f64 * TRUNCATE_BELOW_FRACTION;
        candidate.score > self.high_relevance_threshold && !mostly_consumed
    }

    fn truncated_piece(
        &self,
        candidate: &CandidateDocument,
        remaining: usize,
        joint: usize,
    ) -> Option<(String, usize)> {
        let marker_cost = self.estimator.estimate(TRUNCATION_MARKER);
        let text_tokens = remaining
            .saturating_sub(joint)
            .saturating_sub(self.truncation_buffer_tokens)
            .saturating_sub(marker_cost);
        if text_tokens == 0 {
            return None;
        }

        let prefix = truncate_chars(&candidate.text, self.estimator.max_chars(text_tokens));
        if prefix.is_empty() {
            return None;
        }
        let piece = format!("{prefix}{TRUNCATION_MARKER}");
        let cost = self.estimator.estimate(&piece) + joint;
        Some((piece, cost))
    }
}

impl PackReport {
    fn record(&mut self, candidate: &CandidateDocument) {
        self.documents_used += 1;
        if !self.sources.contains(&candidate.source_id) {
            self.sources.push(candidate.source_id.clone());
        }
    }
}
