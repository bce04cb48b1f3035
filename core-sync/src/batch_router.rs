//! # Batch Router
//!
//! Accumulates discovered items into bounded batches and persists them through
//! a single-flight flush worker.
//!
//! ## Overview
//!
//! - **Size bound**: a batch is cut as soon as it holds `max_batch_size` items.
//! - **Time bound**: a non-empty batch older than `max_batch_linger` is cut by
//!   [`BatchRouter::flush_due`]; the orchestrator waits on
//!   [`BatchRouter::linger_deadline`] next to the adapter stream.
//! - **Single-flight**: each router owns exactly one worker task. Batches are
//!   persisted strictly in the order they were cut, never concurrently for the
//!   same source.
//! - **Backpressure**: cut batches wait in a bounded queue of
//!   `max_pending_flushes`. A full queue suspends `submit`; this is the only
//!   place a run blocks on persistence.
//! - **Bounded concurrency**: a [`FlushPool`] shared by all sources caps how
//!   many persistence calls run at once.
//! - **Retry**: a failing batch is retried with exponential backoff up to
//!   `max_flush_attempts` times, then abandoned. Its items count as failed and
//!   later batches still flush.
//!
//! ```text
//! submit ─→ [open batch] ─cut─→ [queue (bounded)] ─→ worker ─permit─→ PersistencePort
//! ```

use crate::{Result, SyncError};
use bridge_traits::catalog::{CatalogItem, SourceId};
use bridge_traits::storage::PersistencePort;
use core_async::sync::{mpsc, Semaphore, SemaphorePermit};
use core_async::task::JoinHandle;
use core_async::time::{exponential_backoff, sleep, timeout, Duration, Instant};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, PersistenceEvent};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

// ============================================================================
// Flush Pool
// ============================================================================

/// Permits for concurrent persistence calls, shared by every source.
#[derive(Debug, Clone)]
pub struct FlushPool {
    permits: Arc<Semaphore>,
}

impl FlushPool {
    pub fn new(workers: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Number of persistence calls that could start right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.permits.acquire().await.ok()
    }
}

// ============================================================================
// Batches & Statistics
// ============================================================================

/// Ordered items persisted in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub seq: u64,
    pub items: Vec<CatalogItem>,
}

/// Whether `submit` accepted the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// The key was already submitted in this run.
    Duplicate,
}

#[derive(Debug, Default)]
struct FlushCounters {
    persisted: AtomicU64,
    failed: AtomicU64,
    batches_flushed: AtomicU64,
    batches_failed: AtomicU64,
}

/// Snapshot of what the worker has finished so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub persisted: u64,
    pub failed: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
}

/// Final accounting after a drain.
///
/// `persisted + failed + discarded == submitted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub submitted: u64,
    pub persisted: u64,
    pub failed: u64,
    /// Items dropped because a bounded drain ran out of time.
    pub discarded: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
}

#[derive(Debug, Clone)]
struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

// ============================================================================
// Batch Router
// ============================================================================

/// Run-scoped batcher with its own flush worker.
pub struct BatchRouter {
    source_id: SourceId,
    max_batch_size: usize,
    max_linger: Duration,
    open: Vec<CatalogItem>,
    opened_at: Option<Instant>,
    seen: HashSet<String>,
    next_seq: u64,
    submitted: u64,
    queue: Option<mpsc::Sender<Batch>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<FlushCounters>,
}

impl BatchRouter {
    /// Creates a router and spawns its flush worker.
    ///
    /// Must be called from within a runtime.
    pub fn new(
        source_id: SourceId,
        settings: &SyncSettings,
        sink: Arc<dyn PersistencePort>,
        pool: FlushPool,
        event_bus: EventBus,
    ) -> Self {
        let (queue, receiver) = mpsc::channel(settings.max_pending_flushes.max(1));
        let counters = Arc::new(FlushCounters::default());

        let worker = FlushWorker {
            source_id: source_id.clone(),
            sink,
            pool,
            event_bus,
            counters: Arc::clone(&counters),
            policy: RetryPolicy {
                max_attempts: settings.max_flush_attempts.max(1),
                base_delay: settings.retry_base_delay,
                max_delay: settings.retry_max_delay,
            },
        };
        let worker = core_async::spawn(worker.run(receiver));

        Self {
            source_id,
            max_batch_size: settings.max_batch_size.max(1),
            max_linger: settings.max_batch_linger,
            open: Vec::new(),
            opened_at: None,
            seen: HashSet::new(),
            next_seq: 0,
            submitted: 0,
            queue: Some(queue),
            worker: Some(worker),
            counters,
        }
    }

    /// Adds an item to the open batch, cutting it when it is full.
    ///
    /// Suspends while the flush queue is full. Fails once the router has
    /// been drained.
    pub async fn submit(&mut self, item: CatalogItem) -> Result<SubmitOutcome> {
        if self.queue.is_none() {
            return Err(SyncError::Persistence(
                "batch router already drained".to_string(),
            ));
        }

        if !self.seen.insert(item.key.clone()) {
            debug!(source_id = %self.source_id, key = %item.key, "Duplicate item skipped");
            return Ok(SubmitOutcome::Duplicate);
        }

        if self.open.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.open.push(item);
        self.submitted += 1;

        if self.open.len() >= self.max_batch_size {
            self.dispatch_open().await?;
        }

        Ok(SubmitOutcome::Queued)
    }

    /// Cuts the open batch if it is full, or if `force` and it is non-empty.
    pub async fn flush(&mut self, force: bool) -> Result<()> {
        let full = self.open.len() >= self.max_batch_size;
        if full || (force && !self.open.is_empty()) {
            self.dispatch_open().await?;
        }
        Ok(())
    }

    /// When the open batch exceeds its linger time, if it holds anything.
    pub fn linger_deadline(&self) -> Option<Instant> {
        self.opened_at.map(|opened| opened + self.max_linger)
    }

    /// Cuts the open batch if its linger deadline has passed.
    pub async fn flush_due(&mut self) -> Result<()> {
        match self.linger_deadline() {
            Some(deadline) if Instant::now() >= deadline => self.flush(true).await,
            _ => Ok(()),
        }
    }

    async fn dispatch_open(&mut self) -> Result<()> {
        let items = std::mem::take(&mut self.open);
        self.opened_at = None;

        let batch = Batch {
            seq: self.next_seq,
            items,
        };
        self.next_seq += 1;

        let Some(queue) = self.queue.as_ref() else {
            return Err(SyncError::Persistence(
                "batch router already drained".to_string(),
            ));
        };

        debug!(
            source_id = %self.source_id,
            batch_seq = batch.seq,
            items = batch.items.len(),
            "Batch cut"
        );

        queue
            .send(batch)
            .await
            .map_err(|_| SyncError::Persistence("flush worker stopped".to_string()))
    }

    /// Items accepted so far (duplicates excluded).
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    pub fn stats(&self) -> FlushStats {
        FlushStats {
            persisted: self.counters.persisted.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            batches_flushed: self.counters.batches_flushed.load(Ordering::SeqCst),
            batches_failed: self.counters.batches_failed.load(Ordering::SeqCst),
        }
    }

    /// Current accounting; items not yet resolved are reported as discarded.
    pub fn report(&self) -> FlushReport {
        let stats = self.stats();
        FlushReport {
            submitted: self.submitted,
            persisted: stats.persisted,
            failed: stats.failed,
            discarded: self
                .submitted
                .saturating_sub(stats.persisted + stats.failed),
            batches_flushed: stats.batches_flushed,
            batches_failed: stats.batches_failed,
        }
    }

    /// Flushes the open batch, closes the queue and waits for every queued
    /// batch to be persisted or abandoned.
    ///
    /// Calling it again returns the same report.
    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn drain(&mut self) -> Result<FlushReport> {
        if self.queue.is_some() {
            self.flush(true).await?;
        }
        self.queue = None;

        if let Some(worker) = self.worker.take() {
            worker.await.map_err(|e| {
                SyncError::Persistence(format!("flush worker terminated abnormally: {}", e))
            })?;
        }

        Ok(self.report())
    }

    /// Best-effort drain bounded by `grace`.
    ///
    /// Whatever is not persisted or abandoned when the grace period ends is
    /// aborted and counted as discarded.
    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn drain_within(&mut self, grace: Duration) -> FlushReport {
        let deadline = Instant::now() + grace;

        if self.queue.is_some() && timeout(grace, self.flush(true)).await.is_err() {
            warn!(source_id = %self.source_id, "Flush queue still full at end of grace period");
        }
        self.open.clear();
        self.opened_at = None;
        self.queue = None;

        if let Some(mut worker) = self.worker.take() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if timeout(remaining, &mut worker).await.is_err() {
                warn!(source_id = %self.source_id, "Aborting flush worker after grace period");
                worker.abort();
            }
        }

        self.report()
    }
}

impl Drop for BatchRouter {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

// ============================================================================
// Flush Worker
// ============================================================================

struct FlushWorker {
    source_id: SourceId,
    sink: Arc<dyn PersistencePort>,
    pool: FlushPool,
    event_bus: EventBus,
    counters: Arc<FlushCounters>,
    policy: RetryPolicy,
}

impl FlushWorker {
    async fn run(self, mut receiver: mpsc::Receiver<Batch>) {
        while let Some(batch) = receiver.recv().await {
            self.flush_with_retry(batch).await;
        }
        debug!(source_id = %self.source_id, "Flush worker finished");
    }

    #[instrument(skip(self, batch), fields(source_id = %self.source_id, batch_seq = batch.seq, items = batch.items.len()))]
    async fn flush_with_retry(&self, batch: Batch) {
        let size = batch.items.len() as u64;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = match self.pool.acquire().await {
                Some(_permit) => self.sink.flush_batch(&self.source_id, &batch.items).await,
                None => {
                    self.abandon(&batch, attempt, "flush pool closed".to_string());
                    return;
                }
            };

            match result {
                Ok(()) => {
                    self.counters.persisted.fetch_add(size, Ordering::SeqCst);
                    self.counters.batches_flushed.fetch_add(1, Ordering::SeqCst);
                    debug!(attempts = attempt, "Batch persisted");
                    self.event_bus
                        .emit(CoreEvent::Persistence(PersistenceEvent::BatchFlushed {
                            source_id: self.source_id.to_string(),
                            batch_seq: batch.seq,
                            items: batch.items.len(),
                            attempts: attempt,
                        }))
                        .ok();
                    return;
                }
                Err(e) if attempt < self.policy.max_attempts => {
                    let delay = exponential_backoff(
                        self.policy.base_delay,
                        attempt,
                        self.policy.max_delay,
                    );
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Batch flush failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    self.abandon(&batch, attempt, e.to_string());
                    return;
                }
            }
        }
    }

    fn abandon(&self, batch: &Batch, attempts: u32, message: String) {
        self.counters
            .failed
            .fetch_add(batch.items.len() as u64, Ordering::SeqCst);
        self.counters.batches_failed.fetch_add(1, Ordering::SeqCst);
        error!(attempts, error = %message, "Batch abandoned");
        self.event_bus
            .emit(CoreEvent::Persistence(PersistenceEvent::BatchAbandoned {
                source_id: self.source_id.to_string(),
                batch_seq: batch.seq,
                items: batch.items.len(),
                attempts,
                message,
            }))
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use core_async::sync::{Mutex, Notify};

    #[derive(Default)]
    struct RecordingPort {
        batches: Mutex<Vec<Vec<String>>>,
        fail_first: Mutex<u32>,
        fail_batches_containing: Option<String>,
    }

    impl RecordingPort {
        fn failing_first(n: u32) -> Self {
            Self {
                fail_first: Mutex::new(n),
                ..Default::default()
            }
        }

        async fn keys(&self) -> Vec<Vec<String>> {
            self.batches.lock().await.clone()
        }
    }

    #[async_trait]
    impl PersistencePort for RecordingPort {
        async fn flush_batch(&self, _source: &SourceId, items: &[CatalogItem]) -> BridgeResult<()> {
            {
                let mut remaining = self.fail_first.lock().await;
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BridgeError::Persistence("transient".to_string()));
                }
            }
            if let Some(poison) = &self.fail_batches_containing {
                if items.iter().any(|item| &item.key == poison) {
                    return Err(BridgeError::Persistence("poisoned batch".to_string()));
                }
            }
            self.batches
                .lock()
                .await
                .push(items.iter().map(|item| item.key.clone()).collect());
            Ok(())
        }
    }

    /// Blocks every call until released.
    struct GatedPort {
        gate: Notify,
    }

    #[async_trait]
    impl PersistencePort for GatedPort {
        async fn flush_batch(&self, _source: &SourceId, _items: &[CatalogItem]) -> BridgeResult<()> {
            self.gate.notified().await;
            Ok(())
        }
    }

    fn settings(batch_size: usize) -> SyncSettings {
        SyncSettings::default()
            .with_max_batch_size(batch_size)
            .with_retry_delays(Duration::from_millis(1), Duration::from_millis(4))
    }

    fn item(key: &str) -> CatalogItem {
        CatalogItem::new(key, "vod", key)
    }

    fn router(settings: &SyncSettings, port: Arc<dyn PersistencePort>) -> BatchRouter {
        BatchRouter::new(
            SourceId::from("src"),
            settings,
            port,
            FlushPool::new(settings.flush_workers),
            EventBus::new(64),
        )
    }

    #[core_async::test]
    async fn test_batches_never_exceed_size_and_keep_order() {
        let port = Arc::new(RecordingPort::default());
        let mut router = router(&settings(3), port.clone());

        for key in ["a", "b", "c", "d", "e", "f", "g"] {
            router.submit(item(key)).await.unwrap();
        }
        let report = router.drain().await.unwrap();

        let batches = port.keys().await;
        assert_eq!(
            batches,
            vec![
                vec!["a", "b", "c"],
                vec!["d", "e", "f"],
                vec!["g"],
            ]
        );
        assert!(batches.iter().all(|batch| batch.len() <= 3));
        assert_eq!(report.submitted, 7);
        assert_eq!(report.persisted, 7);
        assert_eq!(report.batches_flushed, 3);
        assert_eq!(report.discarded, 0);
    }

    #[core_async::test]
    async fn test_duplicate_keys_are_skipped() {
        let port = Arc::new(RecordingPort::default());
        let mut router = router(&settings(10), port.clone());

        assert_eq!(router.submit(item("a")).await.unwrap(), SubmitOutcome::Queued);
        assert_eq!(
            router.submit(item("a")).await.unwrap(),
            SubmitOutcome::Duplicate
        );
        let report = router.drain().await.unwrap();

        assert_eq!(report.submitted, 1);
        assert_eq!(port.keys().await, vec![vec!["a"]]);
    }

    #[core_async::test]
    async fn test_transient_failure_is_retried() {
        let port = Arc::new(RecordingPort::failing_first(2));
        let mut router = router(&settings(2).with_max_flush_attempts(3), port.clone());

        router.submit(item("a")).await.unwrap();
        router.submit(item("b")).await.unwrap();
        let report = router.drain().await.unwrap();

        assert_eq!(report.persisted, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(port.keys().await.len(), 1);
    }

    #[core_async::test]
    async fn test_exhausted_batch_does_not_block_later_batches() {
        let port = Arc::new(RecordingPort {
            fail_batches_containing: Some("b".to_string()),
            ..Default::default()
        });
        let mut router = router(&settings(2).with_max_flush_attempts(2), port.clone());

        for key in ["a", "b", "c", "d"] {
            router.submit(item(key)).await.unwrap();
        }
        let report = router.drain().await.unwrap();

        assert_eq!(report.failed, 2);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.batches_flushed, 1);
        assert_eq!(port.keys().await, vec![vec!["c", "d"]]);
    }

    #[core_async::test]
    async fn test_flush_respects_force_flag() {
        let port = Arc::new(RecordingPort::default());
        let mut router = router(&settings(5), port.clone());

        router.submit(item("a")).await.unwrap();
        router.flush(false).await.unwrap();
        assert!(router.linger_deadline().is_some());

        router.flush(true).await.unwrap();
        assert!(router.linger_deadline().is_none());

        let report = router.drain().await.unwrap();
        assert_eq!(report.batches_flushed, 1);
    }

    #[core_async::test]
    async fn test_flush_due_after_linger() {
        let port = Arc::new(RecordingPort::default());
        let settings = settings(100).with_max_batch_linger(Duration::from_millis(10));
        let mut router = router(&settings, port.clone());

        router.submit(item("a")).await.unwrap();
        router.flush_due().await.unwrap();
        assert!(router.linger_deadline().is_some());

        sleep(Duration::from_millis(15)).await;
        router.flush_due().await.unwrap();
        assert!(router.linger_deadline().is_none());

        router.drain().await.unwrap();
        assert_eq!(port.keys().await, vec![vec!["a"]]);
    }

    #[core_async::test]
    async fn test_drain_within_discards_unfinished_work() {
        let port = Arc::new(GatedPort {
            gate: Notify::new(),
        });
        let mut router = router(&settings(1), port.clone());

        router.submit(item("a")).await.unwrap();
        router.submit(item("b")).await.unwrap();
        let report = router.drain_within(Duration::from_millis(20)).await;

        assert_eq!(report.submitted, 2);
        assert_eq!(report.persisted, 0);
        assert_eq!(report.discarded, 2);
        assert_eq!(
            report.persisted + report.failed + report.discarded,
            report.submitted
        );
    }

    #[core_async::test]
    async fn test_drain_is_repeatable() {
        let port = Arc::new(RecordingPort::default());
        let mut router = router(&settings(2), port);

        router.submit(item("a")).await.unwrap();
        let first = router.drain().await.unwrap();
        let second = router.drain().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.persisted, 1);
    }

    #[core_async::test]
    async fn test_submit_after_drain_is_rejected() {
        let port = Arc::new(RecordingPort::default());
        let mut router = router(&settings(2), port);

        router.submit(item("a")).await.unwrap();
        router.drain().await.unwrap();

        let result = router.submit(item("b")).await;
        assert!(matches!(
            result,
            Err(SyncError::Persistence(ref msg)) if msg == "batch router already drained"
        ));
        assert_eq!(router.submitted(), 1);
        assert_eq!(router.report().discarded, 0);
    }

    #[test]
    fn test_flush_pool_available() {
        let pool = FlushPool::new(3);
        assert_eq!(pool.available(), 3);
        assert_eq!(FlushPool::new(0).available(), 1);
    }
}
