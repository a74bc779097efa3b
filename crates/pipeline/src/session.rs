//! Per-session state that expires after a period of inactivity.
//!
//! Expired sessions are dropped lazily on access and by an opportunistic
//! sweep that runs at most once per sweep interval.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Upper bound on the time between sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

struct Slot<T> {
    value: T,
    touched: Instant,
}

struct Inner<T> {
    slots: HashMap<String, Slot<T>>,
    last_sweep: Instant,
}

pub(crate) struct SessionMap<T> {
    ttl: Duration,
    sweep_interval: Duration,
    inner: Mutex<Inner<T>>,
}

impl<T: Default> SessionMap<T> {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sweep_interval: ttl.min(MAX_SWEEP_INTERVAL),
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Run `f` on the session's live state, if any. Does not refresh it.
    pub(crate) fn read<R>(&self, session: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.maybe_sweep(&mut inner, now);

        let expired = match inner.slots.get(session) {
            Some(slot) => now.duration_since(slot.touched) >= self.ttl,
            None => return None,
        };
        if expired {
            inner.slots.remove(session);
            return None;
        }
        inner.slots.get(session).map(|slot| f(&slot.value))
    }

    /// Run `f` on the session's state, creating or resetting it if it was
    /// missing or expired, and mark the session as active.
    pub(crate) fn update<R>(&self, session: &str, f: impl FnOnce(&mut T) -> R) -> R {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.maybe_sweep(&mut inner, now);

        let slot = inner.slots.entry(session.to_string()).or_insert_with(|| Slot {
            value: T::default(),
            touched: now,
        });
        if now.duration_since(slot.touched) >= self.ttl {
            slot.value = T::default();
        }
        slot.touched = now;
        f(&mut slot.value)
    }

    pub(crate) fn remove(&self, session: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .slots
            .remove(session)
            .is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).slots.len()
    }

    fn maybe_sweep(&self, inner: &mut Inner<T>, now: Instant) {
        if now.duration_since(inner.last_sweep) < self.sweep_interval {
            return;
        }
        inner.last_sweep = now;

        let before = inner.slots.len();
        let ttl = self.ttl;
        inner.slots.retain(|_, slot| now.duration_since(slot.touched) < ttl);
        let removed = before - inner.slots.len();
        if removed > 0 {
            debug!(removed, remaining = inner.slots.len(), "Expired sessions swept");
        }
    }
}
