//! Keyword-triggered query expansion.
//!
//! When the query mentions a category-indicating term, the expander adds
//! topic-specific variants (the query plus a focus phrase) so retrieval also
//! reaches passages that answer the broader topic.

use std::collections::HashSet;
use tracing::debug;

/// One topic: if any trigger appears in the query, each focus phrase
/// becomes an extra variant.
#[derive(Debug, Clone)]
pub struct ExpansionRule {
    pub topic: &'static str,
    pub triggers: &'static [&'static str],
    pub focus: &'static [&'static str],
}

const DEFAULT_RULES: &[ExpansionRule] = &[
    ExpansionRule {
        topic: "product_inquiry",
        triggers: &["product", "features", "specifications", "specs", "model"],
        focus: &["product specifications", "product features"],
    },
    ExpansionRule {
        topic: "technical_support",
        triggers: &["help", "issue", "problem", "error", "not working"],
        focus: &["troubleshooting steps", "known issues"],
    },
    ExpansionRule {
        topic: "pricing",
        triggers: &["cost", "price", "pricing", "payment", "discount"],
        focus: &["pricing", "payment options", "discounts"],
    },
    ExpansionRule {
        topic: "general_info",
        triggers: &["company", "about", "location", "contact"],
        focus: &["company information", "contact details"],
    },
];

#[derive(Debug, Clone)]
pub struct QueryExpander {
    rules: Vec<ExpansionRule>,
    max_expansions: usize,
}

impl QueryExpander {
    pub fn new(max_expansions: usize) -> Self {
        Self::with_rules(DEFAULT_RULES.to_vec(), max_expansions)
    }

    pub fn with_rules(rules: Vec<ExpansionRule>, max_expansions: usize) -> Self {
        Self {
            rules,
            max_expansions,
        }
    }

    /// Rules whose triggers appear in `query`, in table order.
    fn matching<'a>(&'a self, query: &str) -> Vec<&'a ExpansionRule> {
        let lowered = query.to_lowercase();
        let words: HashSet<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        self.rules
            .iter()
            .filter(|rule| {
                rule.triggers.iter().any(|t| {
                    if t.contains(' ') {
                        lowered.contains(t)
                    } else {
                        words.contains(t)
                    }
                })
            })
            .collect()
    }

    /// The first topic whose triggers appear in `query`.
    pub fn topic(&self, query: &str) -> Option<&'static str> {
        self.matching(query).first().map(|rule| rule.topic)
    }

    /// Additional variants for `query`, excluding the query itself, deduplicated
    /// and capped at `max_expansions`.
    pub fn expand(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::from([query.trim().to_lowercase()]);
        let mut variants = Vec::new();

        for rule in self.matching(query) {
            debug!(topic = rule.topic, "Query expansion triggered");

            for focus in rule.focus {
                if variants.len() >= self.max_expansions {
                    return variants;
                }
                let variant = format!("{} {focus}", query.trim());
                if seen.insert(variant.to_lowercase()) {
                    variants.push(variant);
                }
            }
        }

        variants
    }
}
