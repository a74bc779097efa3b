//! Generic batch aggregation.
//!
//! Coalesces many concurrent single-item submissions into few calls of an
//! injected async `process(items) -> results` function. Each submitter
//! receives a oneshot completion handle and suspends on it; whichever
//! submission (or wait timer) decides to flush swaps the pending batch for
//! a fresh one under the lock and runs `process` outside it.
//!
//! Flush triggers:
//! - the pending batch reaches `batch_size`
//! - a submission arrives `max_wait` or later after the batch was opened
//! - the wait timer armed by the batch's first submission fires
//!
//! Each flush runs on its own task, so a cancelled submitter cannot strand
//! the other items of its batch.

use futures::FutureExt;
use futures::future::BoxFuture;
use ragpipe_core::{BatchError, ProviderError};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error};

/// The injected batch-processing function.
pub type ProcessFn<T, R> =
    Arc<dyn Fn(Vec<T>) -> BoxFuture<'static, Result<Vec<R>, ProviderError>> + Send + Sync>;

struct BatchItem<T, R> {
    payload: T,
    completion: oneshot::Sender<Result<R, BatchError>>,
}

struct PendingBatch<T, R> {
    items: Vec<BatchItem<T, R>>,
    opened_at: Option<Instant>,
    /// Bumped on every swap; a wait timer only flushes the generation it was armed for.
    generation: u64,
}

impl<T, R> PendingBatch<T, R> {
    fn take(&mut self) -> Vec<BatchItem<T, R>> {
        self.opened_at = None;
        self.generation += 1;
        std::mem::take(&mut self.items)
    }
}

/// Counters describing aggregator activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub submitted: u64,
    pub batches: u64,
    pub failed_batches: u64,
}

#[derive(Default)]
struct StatsInner {
    submitted: AtomicU64,
    batches: AtomicU64,
    failed_batches: AtomicU64,
}

struct Inner<T, R> {
    batch_size: usize,
    max_wait: Duration,
    process: ProcessFn<T, R>,
    pending: Mutex<PendingBatch<T, R>>,
    stats: StatsInner,
}

/// Coalesces concurrent submissions into batched `process` calls.
///
/// Cheap to clone; clones share the same pending batch.
pub struct BatchAggregator<T, R> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R> Clone for BatchAggregator<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, R> BatchAggregator<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F, Fut>(batch_size: usize, max_wait: Duration, process: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<R>, ProviderError>> + Send + 'static,
    {
        let process: ProcessFn<T, R> = Arc::new(move |items| process(items).boxed());
        Self {
            inner: Arc::new(Inner {
                batch_size: batch_size.max(1),
                max_wait,
                process,
                pending: Mutex::new(PendingBatch {
                    items: Vec::new(),
                    opened_at: None,
                    generation: 0,
                }),
                stats: StatsInner::default(),
            }),
        }
    }

    /// Submit one item and wait for its batch to be processed.
    pub async fn submit(&self, payload: T) -> Result<R, BatchError> {
        let (completion, handle) = oneshot::channel();
        self.inner.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let mut arm_timer = None;
        let ready = {
            let mut pending = self.inner.pending.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();

            let opened_at = *pending.opened_at.get_or_insert(now);
            if pending.items.is_empty() {
                arm_timer = Some(pending.generation);
            }
            pending.items.push(BatchItem { payload, completion });

            let full = pending.items.len() >= self.inner.batch_size;
            let stale = now.saturating_duration_since(opened_at) >= self.inner.max_wait;
            if full || stale {
                Some(pending.take())
            } else {
                None
            }
        };

        match (ready, arm_timer) {
            (Some(items), _) => {
                tokio::spawn(Inner::flush(self.inner.clone(), items));
            }
            (None, Some(generation)) => self.arm_timer(generation),
            (None, None) => {}
        }

        handle.await.unwrap_or(Err(BatchError::Dropped))
    }

    pub fn stats(&self) -> BatchStats {
        let s = &self.inner.stats;
        BatchStats {
            submitted: s.submitted.load(Ordering::Relaxed),
            batches: s.batches.load(Ordering::Relaxed),
            failed_batches: s.failed_batches.load(Ordering::Relaxed),
        }
    }

    fn arm_timer(&self, generation: u64) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.max_wait).await;
            let items = {
                let mut pending = inner.pending.lock().unwrap_or_else(|e| e.into_inner());
                if pending.generation != generation || pending.items.is_empty() {
                    return;
                }
                pending.take()
            };
            Inner::flush(inner, items).await;
        });
    }
}

impl<T, R> Inner<T, R> {
    async fn flush(self: Arc<Self>, items: Vec<BatchItem<T, R>>) {
        let expected = items.len();
        let (payloads, completions): (Vec<T>, Vec<_>) = items
            .into_iter()
            .map(|item| (item.payload, item.completion))
            .unzip();

        self.stats.batches.fetch_add(1, Ordering::Relaxed);
        debug!(size = expected, "Flushing batch");

        match (self.process)(payloads).await {
            Ok(results) if results.len() == expected => {
                for (completion, result) in completions.into_iter().zip(results) {
                    // Receiver gone means the submitter was cancelled.
                    let _ = completion.send(Ok(result));
                }
            }
            Ok(results) => {
                self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                let err = BatchError::LengthMismatch {
                    expected,
                    got: results.len(),
                };
                error!(error = %err, "Batch processor broke the one-result-per-item contract");
                reject_all(completions, err);
            }
            Err(e) => {
                self.stats.failed_batches.fetch_add(1, Ordering::Relaxed);
                error!(size = expected, error = %e, "Batch processing failed");
                reject_all(completions, BatchError::Failed(e));
            }
        }
    }
}

fn reject_all<R>(completions: Vec<oneshot::Sender<Result<R, BatchError>>>, err: BatchError) {
    for completion in completions {
        let _ = completion.send(Err(err.clone()));
    }
}
