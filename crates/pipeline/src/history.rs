//! Bounded per-session conversation history.

use crate::session::SessionMap;
use ragpipe_core::Message;
use std::collections::VecDeque;
use std::time::Duration;

/// Keeps the last `limit` messages of each session. Sessions idle for
/// longer than the TTL are forgotten.
pub struct HistoryStore {
    limit: usize,
    sessions: SessionMap<VecDeque<Message>>,
}

impl HistoryStore {
    pub fn new(limit: usize, ttl: Duration) -> Self {
        Self {
            limit,
            sessions: SessionMap::new(ttl),
        }
    }

    /// The session's retained messages, oldest first.
    pub fn get(&self, session: &str) -> Vec<Message> {
        self.sessions
            .read(session, |messages| messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append a user/assistant exchange, dropping the oldest messages past the limit.
    pub fn record_exchange(&self, session: &str, user: Message, assistant: Message) {
        if self.limit == 0 {
            return;
        }
        let limit = self.limit;
        self.sessions.update(session, |messages| {
            messages.push_back(user);
            messages.push_back(assistant);
            while messages.len() > limit {
                messages.pop_front();
            }
        });
    }

    /// Forget a session. Returns whether it existed.
    pub fn clear(&self, session: &str) -> bool {
        self.sessions.remove(session)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
