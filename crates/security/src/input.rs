//! Inbound message screening.
//!
//! Rejects empty messages, messages over the configured character limit,
//! and messages containing template or script injection markers.

use regex_lite::Regex;
use tracing::warn;

/// Patterns that indicate template, markup or shell-call injection.
const BLOCKED_PATTERNS: &[&str] = &[r"\{\{.*\}\}", r"<script.*?>", r"(?i)system\(", r"(?i)exec\("];

/// Result of screening an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCheckResult {
    /// Message is acceptable.
    Allowed,
    /// Message was rejected.
    Rejected { reason: String },
}

impl InputCheckResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

pub struct InputValidator {
    max_chars: usize,
    blocked: Vec<Regex>,
}

impl InputValidator {
    pub fn new(max_chars: usize) -> Self {
        let blocked = BLOCKED_PATTERNS
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern, error = %e, "Skipping invalid input pattern");
                    None
                }
            })
            .collect();

        Self { max_chars, blocked }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Screen `text`. Length is measured in characters, not bytes.
    pub fn check(&self, text: &str) -> InputCheckResult {
        if text.trim().is_empty() {
            return InputCheckResult::Rejected {
                reason: "message is empty".into(),
            };
        }

        let chars = text.chars().count();
        if chars > self.max_chars {
            return InputCheckResult::Rejected {
                reason: format!("message is {chars} characters, limit is {}", self.max_chars),
            };
        }

        if let Some(re) = self.blocked.iter().find(|re| re.is_match(text)) {
            return InputCheckResult::Rejected {
                reason: format!("message matches blocked pattern `{}`", re.as_str()),
            };
        }

        InputCheckResult::Allowed
    }
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_question_is_allowed() {
        let v = InputValidator::default();
        assert!(v.check("What is your return policy?").is_allowed());
    }

    #[test]
    fn empty_and_blank_are_rejected() {
        let v = InputValidator::default();
        assert!(!v.check("").is_allowed());
        assert!(!v.check("   \n\t").is_allowed());
    }

    #[test]
    fn length_limit_counts_characters() {
        let v = InputValidator::new(5);
        assert!(v.check("héllo").is_allowed());
        assert!(!v.check("héllo!").is_allowed());
    }

    #[test]
    fn injection_markers_are_rejected() {
        let v = InputValidator::default();
        for text in [
            "render {{ secrets }} please",
            "<script src=x>",
            "call SYSTEM('rm')",
            "os.exec(cmd)",
        ] {
            assert!(
                matches!(v.check(text), InputCheckResult::Rejected { .. }),
                "expected rejection for {text:?}"
            );
        }
    }

    #[test]
    fn all_patterns_compile() {
        assert_eq!(InputValidator::default().blocked.len(), BLOCKED_PATTERNS.len());
    }
}
