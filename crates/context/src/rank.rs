//! Candidate deduplication, priority ranking and the diversity pass.

use ragpipe_core::{HitMetadata, SearchHit, fingerprint_str};
use std::collections::{HashMap, HashSet};

/// Characters of leading text hashed when a hit carries no content hash.
const FINGERPRINT_PREFIX_CHARS: usize = 200;

/// Multiplier when a query term appears in the document's source label or title.
const LABEL_BOOST: f32 = 1.5;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "you", "your", "what", "how", "can", "does", "with", "about",
    "this", "that", "have", "from", "is", "do", "of", "to", "in", "on", "a", "an",
];

/// A retrieved passage being ranked for one context-assembly call.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateDocument {
    pub text: String,
    /// Raw similarity score.
    pub score: f32,
    pub source_id: String,
    /// `score` after boosts; never below `score`.
    pub priority_score: f32,
    pub metadata: HitMetadata,
}

impl From<SearchHit> for CandidateDocument {
    fn from(hit: SearchHit) -> Self {
        Self {
            priority_score: hit.score,
            text: hit.text,
            score: hit.score,
            source_id: hit.source,
            metadata: hit.metadata,
        }
    }
}

impl CandidateDocument {
    /// Dedup key: the explicit content hash if present, else a digest of the
    /// leading slice of text.
    pub fn content_fingerprint(&self) -> String {
        match &self.metadata.content_hash {
            Some(hash) => hash.clone(),
            None => {
                let prefix: String = self.text.chars().take(FINGERPRINT_PREFIX_CHARS).collect();
                fingerprint_str(&prefix)
            }
        }
    }
}

/// Merge hits from all variants, keeping the higher-scoring copy of any
/// duplicate. First-seen order is preserved.
pub fn dedupe(hits: impl IntoIterator<Item = SearchHit>) -> Vec<CandidateDocument> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<CandidateDocument> = Vec::new();

    for hit in hits {
        let candidate = CandidateDocument::from(hit);
        let key = candidate.content_fingerprint();
        match positions.get(&key) {
            Some(&i) => {
                if candidate.score > unique[i].score {
                    unique[i] = candidate;
                }
            }
            None => {
                positions.insert(key, unique.len());
                unique.push(candidate);
            }
        }
    }

    unique
}

/// A content-type heuristic: a query mentioning any `query_markers` boosts
/// documents whose text or type mentions any `content_markers`.
#[derive(Debug, Clone)]
pub struct IntentBoost {
    pub query_markers: &'static [&'static str],
    pub content_markers: &'static [&'static str],
    pub factor: f32,
}

const DEFAULT_INTENTS: &[IntentBoost] = &[
    IntentBoost {
        query_markers: &["spec", "specs", "specification", "specifications", "dimensions", "technical"],
        content_markers: &["specification", "dimensions", "technical"],
        factor: 1.3,
    },
    IntentBoost {
        query_markers: &["price", "cost", "pricing", "discount"],
        content_markers: &["price", "pricing", "$", "discount"],
        factor: 1.2,
    },
    IntentBoost {
        query_markers: &["return", "refund", "warranty", "policy"],
        content_markers: &["policy", "return", "refund", "warranty"],
        factor: 1.2,
    },
];

#[derive(Debug, Clone)]
pub struct Ranker {
    threshold: f32,
    intents: Vec<IntentBoost>,
}

impl Ranker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            intents: DEFAULT_INTENTS.to_vec(),
        }
    }

    /// Drop candidates below the similarity threshold, compute priority
    /// scores, and sort by priority (descending, stable on ties).
    pub fn rank(&self, query: &str, candidates: Vec<CandidateDocument>) -> Vec<CandidateDocument> {
        let lowered = query.to_lowercase();
        let terms: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 3 && !STOPWORDS.contains(w))
            .collect();
        let active: Vec<&IntentBoost> = self
            .intents
            .iter()
            .filter(|intent| intent.query_markers.iter().any(|m| terms.contains(m)))
            .collect();

        let mut ranked: Vec<CandidateDocument> = candidates
            .into_iter()
            .filter(|c| c.score >= self.threshold)
            .map(|mut c| {
                c.priority_score = c.score * boost_factor(&c, &terms, &active);
                c
            })
            .collect();

        ranked.sort_by(|a, b| b.priority_score.total_cmp(&a.priority_score));
        ranked
    }
}

fn boost_factor(candidate: &CandidateDocument, terms: &[&str], intents: &[&IntentBoost]) -> f32 {
    let mut factor = 1.0;

    let label = match &candidate.metadata.title {
        Some(title) => format!("{} {}", candidate.source_id, title).to_lowercase(),
        None => candidate.source_id.to_lowercase(),
    };
    if terms.iter().any(|t| label.contains(t)) {
        factor *= LABEL_BOOST;
    }

    if !intents.is_empty() {
        let text = candidate.text.to_lowercase();
        let doc_type = candidate
            .metadata
            .doc_type
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default();
        for intent in intents {
            if intent
                .content_markers
                .iter()
                .any(|m| text.contains(m) || doc_type.contains(m))
            {
                factor *= intent.factor.max(1.0);
            }
        }
    }

    factor
}

/// Put the best-ranked document of each source first, then everything else
/// in rank order.
pub fn diversify(ranked: Vec<CandidateDocument>) -> Vec<CandidateDocument> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut leaders = Vec::new();
    let mut rest = Vec::new();

    for candidate in ranked {
        if seen.insert(candidate.source_id.clone()) {
            leaders.push(candidate);
        } else {
            rest.push(candidate);
        }
    }

    leaders.extend(rest);
    leaders
}
