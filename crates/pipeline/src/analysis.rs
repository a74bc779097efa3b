//! Interaction analysis: each answered message gets a keyword topic, and
//! topics, context usage and confidence are tallied per session and overall.

use crate::session::SessionMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Category for messages that match no topic.
pub const UNKNOWN_CATEGORY: &str = "unknown";

const SESSION_TOP_CATEGORIES: usize = 3;
const GLOBAL_TOP_CATEGORIES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionAnalysis {
    pub session_id: String,
    pub interactions: u64,
    pub common_categories: Vec<CategoryCount>,
    pub context_usage_rate: f64,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalAnalysis {
    pub total_interactions: u64,
    /// Sessions with unexpired interaction records.
    pub active_sessions: usize,
    pub top_categories: Vec<CategoryCount>,
    pub context_usage_rate: f64,
    pub average_confidence: f64,
}

#[derive(Debug, Default)]
struct Tally {
    interactions: u64,
    context_used: u64,
    confidence_sum: f64,
    categories: HashMap<String, u64>,
}

impl Tally {
    fn record(&mut self, category: &str, context_used: bool, confidence: f32) {
        self.interactions += 1;
        if context_used {
            self.context_used += 1;
        }
        self.confidence_sum += f64::from(confidence);
        *self.categories.entry(category.to_string()).or_default() += 1;
    }

    fn rate(&self, n: f64) -> f64 {
        if self.interactions == 0 {
            0.0
        } else {
            n / self.interactions as f64
        }
    }

    /// Most frequent categories, ties broken by name.
    fn top(&self, limit: usize) -> Vec<CategoryCount> {
        let mut counts: Vec<CategoryCount> = self
            .categories
            .iter()
            .map(|(category, &count)| CategoryCount {
                category: category.clone(),
                count,
            })
            .collect();
        counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        counts.truncate(limit);
        counts
    }
}

pub struct InteractionLog {
    sessions: SessionMap<Tally>,
    global: Mutex<Tally>,
}

impl InteractionLog {
    /// Session tallies expire after `ttl` of inactivity; the global tally does not.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: SessionMap::new(ttl),
            global: Mutex::new(Tally::default()),
        }
    }

    pub fn record(&self, session: &str, category: &str, context_used: bool, confidence: f32) {
        self.sessions
            .update(session, |tally| tally.record(category, context_used, confidence));
        self.global
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(category, context_used, confidence);
    }

    pub fn session(&self, session: &str) -> Option<SessionAnalysis> {
        self.sessions.read(session, |tally| SessionAnalysis {
            session_id: session.to_string(),
            interactions: tally.interactions,
            common_categories: tally.top(SESSION_TOP_CATEGORIES),
            context_usage_rate: tally.rate(tally.context_used as f64),
            average_confidence: tally.rate(tally.confidence_sum),
        })
    }

    pub fn global(&self) -> GlobalAnalysis {
        let active_sessions = self.sessions.len();
        let tally = self.global.lock().unwrap_or_else(|e| e.into_inner());
        GlobalAnalysis {
            total_interactions: tally.interactions,
            active_sessions,
            top_categories: tally.top(GLOBAL_TOP_CATEGORIES),
            context_usage_rate: tally.rate(tally.context_used as f64),
            average_confidence: tally.rate(tally.confidence_sum),
        }
    }
}
