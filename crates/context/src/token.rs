//! Token estimation.
//!
//! Budgets are enforced against an estimate, not an exact tokenizer. The
//! estimator is a trait so a stricter (or exact) implementation can be
//! swapped in; the packing code only relies on `estimate` being monotone
//! in text length and `max_chars` being its inverse.

/// Estimates how many model tokens a piece of text costs.
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count for `text`.
    fn estimate(&self, text: &str) -> usize;

    /// The longest character count whose estimate is at most `tokens`.
    fn max_chars(&self, tokens: usize) -> usize;
}

/// Fixed characters-per-token heuristic, rounding up.
///
/// The default of 4 characters per token is within ~10% for BPE
/// tokenizers on English text.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    fn max_chars(&self, tokens: usize) -> usize {
        tokens.saturating_mul(self.chars_per_token)
    }
}

/// Truncate `text` to at most `max_chars` characters, preferring to cut at
/// the last whitespace in the second half of the allowance.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    let end = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(i, _)| i);
    let prefix = &text[..end];
    if end == text.len() {
        return prefix;
    }

    match prefix.rfind(char::is_whitespace) {
        Some(cut) if cut >= end / 2 => prefix[..cut].trim_end(),
        _ => prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(CharRatioEstimator::default().estimate(""), 0);
    }

    #[test]
    fn rounds_up() {
        let e = CharRatioEstimator::default();
        assert_eq!(e.estimate("test"), 1);
        assert_eq!(e.estimate("hello"), 2);
        assert_eq!(e.estimate(&"a".repeat(100)), 25);
    }

    #[test]
    fn counts_characters_not_bytes() {
        // 4 chars, 8 bytes
        assert_eq!(CharRatioEstimator::default().estimate("éééé"), 1);
    }

    #[test]
    fn max_chars_inverts_estimate() {
        let e = CharRatioEstimator::new(3);
        let chars = e.max_chars(10);
        assert_eq!(e.estimate(&"x".repeat(chars)), 10);
        assert_eq!(e.estimate(&"x".repeat(chars + 1)), 11);
    }

    #[test]
    fn zero_ratio_is_clamped() {
        assert_eq!(CharRatioEstimator::new(0).chars_per_token(), 1);
    }

    #[test]
    fn truncation_prefers_word_boundary() {
        assert_eq!(truncate_chars("alpha beta gamma", 13), "alpha beta");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("unbroken", 4), "unbr");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("ééééé", 2), "éé");
    }
}
