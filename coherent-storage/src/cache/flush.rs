//! Write-back Flush Job
//!
//! Drains the write-back dirty set into the store on a fixed interval.
//! Ticks are single-flight: a tick that starts while another is still
//! running returns [`FlushOutcome::Skipped`] without touching the dirty set.
//! Failures are logged and left for the next tick; nothing is retried inline.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coherent_core::constants::DEFAULT_FLUSH_BATCH_SIZE;
use coherent_core::CoherentError;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::traits::CacheBackend;
use super::write_back::WriteBackQueue;
use crate::store::RecordStore;

// ============================================================================
// OUTCOME
// ============================================================================

/// What one flush tick did.
#[derive(Debug, Clone)]
pub enum FlushOutcome {
    /// The dirty set was empty.
    Idle,
    /// Another tick was in flight.
    Skipped,
    /// Every dirty member was persisted.
    Completed { persisted: usize },
    /// The tick stopped at an error; the rest stays dirty.
    Partial {
        persisted: usize,
        error: CoherentError,
    },
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for flush activity.
#[derive(Debug, Default)]
pub struct FlushMetrics {
    /// Ticks that ran, including idle ones
    pub ticks: AtomicU64,

    /// Ticks skipped because another was in flight
    pub skipped: AtomicU64,

    /// Records persisted since startup
    pub persisted: AtomicU64,

    /// Ticks that ended in an error
    pub errors: AtomicU64,
}

impl FlushMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> FlushMetricsSnapshot {
        FlushMetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of flush metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushMetricsSnapshot {
    pub ticks: u64,
    pub skipped: u64,
    pub persisted: u64,
    pub errors: u64,
}

// ============================================================================
// JOB
// ============================================================================

/// Clears the in-flight flag when a tick ends, including by cancellation.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight flush over a [`WriteBackQueue`].
pub struct FlushJob<S: ?Sized, C: ?Sized> {
    queue: Arc<WriteBackQueue<S, C>>,
    batch_size: usize,
    in_flight: AtomicBool,
    metrics: Arc<FlushMetrics>,
}

impl<S, C> FlushJob<S, C>
where
    S: RecordStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    pub fn new(queue: Arc<WriteBackQueue<S, C>>) -> Self {
        Self {
            queue,
            batch_size: DEFAULT_FLUSH_BATCH_SIZE,
            in_flight: AtomicBool::new(false),
            metrics: Arc::new(FlushMetrics::new()),
        }
    }

    /// Set how many dirty members each cursor step fetches.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn metrics(&self) -> Arc<FlushMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run one flush unless one is already running.
    pub async fn tick(&self) -> FlushOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.metrics.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Flush already in flight, skipping tick");
            return FlushOutcome::Skipped;
        }
        let _guard = InFlight(&self.in_flight);

        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        let report = self.queue.drain(self.batch_size).await;
        self.metrics
            .persisted
            .fetch_add(report.persisted as u64, Ordering::Relaxed);

        match report.error {
            Some(error) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    error = %error,
                    persisted = report.persisted,
                    pending = report.pending,
                    "Flush stopped early; remaining customers stay dirty"
                );
                FlushOutcome::Partial {
                    persisted: report.persisted,
                    error,
                }
            }
            None if report.pending == 0 => FlushOutcome::Idle,
            None => {
                tracing::info!(persisted = report.persisted, "Flush completed");
                FlushOutcome::Completed {
                    persisted: report.persisted,
                }
            }
        }
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that flushes the dirty set every `period`.
///
/// Runs until the shutdown signal is received. The first tick fires
/// immediately. Missed ticks are skipped rather than bunched up.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(flush_task(job, Duration::from_secs(5), shutdown_rx));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn flush_task<S, C>(
    job: Arc<FlushJob<S, C>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<FlushMetrics>
where
    S: RecordStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    let mut flush_interval = interval(period);
    flush_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_ms = period.as_millis() as u64,
        batch_size = job.batch_size,
        "Write-back flush task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Write-back flush task shutting down");
                    break;
                }
            }

            _ = flush_interval.tick() => {
                job.tick().await;
            }
        }
    }

    let snapshot = job.metrics.snapshot();
    tracing::info!(
        ticks = snapshot.ticks,
        skipped = snapshot.skipped,
        persisted = snapshot.persisted,
        errors = snapshot.errors,
        "Write-back flush task completed"
    );

    job.metrics()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheBackend;
    use crate::service::CustomerService;
    use crate::InMemoryRecordStore;
    use coherent_core::Customer;

    type Job = FlushJob<InMemoryRecordStore, InMemoryCacheBackend>;

    fn setup() -> (
        Arc<InMemoryRecordStore>,
        Arc<WriteBackQueue<InMemoryRecordStore, InMemoryCacheBackend>>,
        Arc<Job>,
    ) {
        let store = Arc::new(InMemoryRecordStore::new());
        let backend = Arc::new(InMemoryCacheBackend::new());
        let queue = Arc::new(WriteBackQueue::new(Arc::clone(&store), backend));
        let job = Arc::new(FlushJob::new(Arc::clone(&queue)).with_batch_size(2));
        (store, queue, job)
    }

    #[tokio::test]
    async fn test_tick_on_empty_set_is_idle() {
        let (_store, _queue, job) = setup();
        assert!(matches!(job.tick().await, FlushOutcome::Idle));
        assert_eq!(job.metrics().snapshot().ticks, 1);
    }

    #[tokio::test]
    async fn test_tick_persists_in_batches() {
        let (store, queue, job) = setup();
        for age in 20..25 {
            queue.save(Customer::new("Batch", "Flush", age)).await.unwrap();
        }

        let outcome = job.tick().await;
        assert!(matches!(outcome, FlushOutcome::Completed { persisted: 5 }));
        assert_eq!(store.len(), 5);
        assert_eq!(queue.pending().await.unwrap(), 0);
        assert_eq!(job.metrics().snapshot().persisted, 5);
    }

    #[tokio::test]
    async fn test_partial_tick_reports_error() {
        let (store, queue, job) = setup();
        for age in 20..23 {
            queue.save(Customer::new("Batch", "Flush", age)).await.unwrap();
        }
        store.set_unavailable(true);

        let outcome = job.tick().await;
        match outcome {
            FlushOutcome::Partial { persisted, error } => {
                assert_eq!(persisted, 0);
                assert!(error.is_store_unavailable());
            }
            other => panic!("expected partial flush, got {:?}", other),
        }
        assert_eq!(queue.pending().await.unwrap(), 3);
        assert_eq!(job.metrics().snapshot().errors, 1);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let (_store, _queue, job) = setup();
        job.in_flight.store(true, Ordering::SeqCst);

        assert!(matches!(job.tick().await, FlushOutcome::Skipped));
        assert_eq!(job.metrics().snapshot().skipped, 1);

        job.in_flight.store(false, Ordering::SeqCst);
        assert!(matches!(job.tick().await, FlushOutcome::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_task_drains_until_shutdown() {
        let (store, queue, job) = setup();
        queue.save(Customer::new("Timed", "Flush", 30)).await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(flush_task(
            Arc::clone(&job),
            Duration::from_millis(100),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(250)).await;
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();

        assert_eq!(store.len(), 1);
        assert!(metrics.snapshot().ticks >= 2);
    }
}
