//! Sliding-window rate limiter.
//!
//! Tracks request timestamps per caller identity (network address). Each
//! call records its own timestamp before the decision, so the limit is
//! inclusive of the triggering request and rejected calls still occupy the
//! window.
//!
//! Locking: the identity map sits behind an `RwLock`; each identity's window
//! has its own `Mutex`. Known identities only take the shared read lock, so
//! independent callers never contend. Inserting a new identity and the
//! sweep take the write lock.

use ragpipe_config::RateLimitConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    sweep_interval: Duration,
    clients: RwLock<HashMap<String, Mutex<VecDeque<Instant>>>>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    /// A limiter admitting `max_requests` per 60-second window.
    pub fn new(max_requests: usize) -> Self {
        Self::with_window(max_requests, WINDOW, WINDOW)
    }

    pub fn with_window(max_requests: usize, window: Duration, sweep_interval: Duration) -> Self {
        Self {
            max_requests,
            window,
            sweep_interval,
            clients: RwLock::new(HashMap::new()),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::with_window(
            config.max_requests_per_minute,
            WINDOW,
            Duration::from_secs(config.sweep_interval_secs),
        )
    }

    /// Record a request from `identity` and decide whether to admit it.
    pub fn allow(&self, identity: &str) -> bool {
        self.maybe_sweep();

        {
            let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
            if let Some(window) = clients.get(identity) {
                let mut timestamps = window.lock().unwrap_or_else(|e| e.into_inner());
                return self.record(&mut timestamps);
            }
        }

        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        let window = clients.entry(identity.to_string()).or_default();
        let timestamps = window.get_mut().unwrap_or_else(|e| e.into_inner());
        self.record(timestamps)
    }

    /// Prune every identity's window and forget identities left empty.
    /// Returns the number of identities removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        let before = clients.len();

        clients.retain(|_, window| {
            let timestamps = window.get_mut().unwrap_or_else(|e| e.into_inner());
            prune(timestamps, now, self.window);
            !timestamps.is_empty()
        });

        let removed = before - clients.len();
        if removed > 0 {
            debug!(removed, remaining = clients.len(), "Rate limiter swept idle callers");
        }
        removed
    }

    /// Number of identities currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn record(&self, timestamps: &mut VecDeque<Instant>) -> bool {
        // Taken under the window's lock so each deque stays time-ordered.
        let now = Instant::now();
        timestamps.push_back(now);
        prune(timestamps, now, self.window);
        timestamps.len() <= self.max_requests
    }

    fn maybe_sweep(&self) {
        let now = Instant::now();
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(|e| e.into_inner());
            if now.saturating_duration_since(*last) < self.sweep_interval {
                return;
            }
            *last = now;
        }
        self.cleanup();
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while timestamps
        .front()
        .is_some_and(|t| now.saturating_duration_since(*t) >= window)
    {
        timestamps.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn fourth_request_in_window_is_rejected() {
        let limiter = RateLimiter::new(3);
        let results: Vec<bool> = (0..4).map(|_| limiter.allow("10.0.0.1")).collect();
        assert_eq!(results, vec![true, true, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_after_sixty_seconds() {
        let limiter = RateLimiter::new(3);
        for _ in 0..4 {
            limiter.allow("10.0.0.1");
        }

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.allow("10.0.0.1"));
    }

    #[tokio::test(start_paused = true)]
    async fn identities_are_counted_independently() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn partial_expiry_frees_only_old_slots() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.allow("c"));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.allow("c"));
        tokio::time::advance(Duration::from_secs(31)).await;
        // First request aged out; second (31s old) and this one remain.
        assert!(limiter.allow("c"));
        assert!(!limiter.allow("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_forgets_idle_identities() {
        let limiter = RateLimiter::new(5);
        limiter.allow("idle");
        tokio::time::advance(Duration::from_secs(45)).await;
        limiter.allow("active");
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn opportunistic_sweep_runs_on_allow() {
        let limiter = RateLimiter::new(5);
        for i in 0..10 {
            limiter.allow(&format!("caller-{i}"));
        }
        assert_eq!(limiter.tracked_identities(), 10);

        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.allow("new-caller");
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn concurrent_callers_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new(50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || (0..20).filter(|_| limiter.allow("shared")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
