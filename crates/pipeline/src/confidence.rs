//! Confidence estimate from hedge-word counting and response length.

/// Phrases that signal an uncertain answer. Each one present costs 0.1.
pub const HEDGE_MARKERS: &[&str] = &[
    "i'm not sure",
    "might be",
    "possibly",
    "perhaps",
    "may",
    "could be",
    "uncertain",
    "unclear",
    "don't know",
    "not confident",
];

/// Responses shorter than this many characters are scaled down linearly.
const FULL_LENGTH_CHARS: f32 = 100.0;

/// Below this confidence a response is flagged for human follow-up.
pub const NEEDS_HUMAN_BELOW: f32 = 0.4;

/// Confidence in [0, 1], rounded to two decimals.
pub fn confidence(response: &str) -> f32 {
    let lowered = response.to_lowercase();
    let hedges = HEDGE_MARKERS.iter().filter(|m| lowered.contains(*m)).count();

    let base = (1.0 - 0.1 * hedges as f32).max(0.0);
    let length_factor = (response.chars().count() as f32 / FULL_LENGTH_CHARS).min(1.0);

    (base * length_factor * 100.0).round() / 100.0
}

pub fn needs_human(confidence: f32) -> bool {
    confidence < NEEDS_HUMAN_BELOW
}
