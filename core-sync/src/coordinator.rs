//! # Sync Coordinator
//!
//! Control surface for catalog synchronization across sources.
//!
//! ## Overview
//!
//! The `SyncCoordinator` owns one entry per registered source:
//! - the [`SourceAdapter`] that reads it
//! - a `watch` channel carrying its latest [`SyncStatus`]
//! - a lease naming the run currently in flight, if any
//!
//! A lease is taken atomically by [`SyncCoordinator::start`]; a second start
//! for the same source is rejected with [`SyncError::SyncInProgress`] until
//! the run task ends. Different sources run concurrently and share nothing
//! but the flush pool, the fingerprint store and the persistence port.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//! use std::sync::Arc;
//!
//! # async fn example(coordinator: Arc<SyncCoordinator>, adapter: Arc<dyn SourceAdapter>) -> core_sync::Result<()> {
//! let source_id = adapter.source_id();
//! coordinator.register_source(adapter).await?;
//!
//! let handle = coordinator.start(&source_id).await?;
//! let status = handle.wait().await;
//! println!("{:?}", status);
//! # Ok(())
//! # }
//! ```

use crate::batch_router::FlushPool;
use crate::orchestrator::{RunEnvironment, SyncRun};
use crate::run::RunId;
use crate::state::{FailureKind, RunFailure, SyncStatus, SyncSummary};
use crate::{Result, SyncError};
use bridge_traits::catalog::{SourceId, SyncStrategy};
use bridge_traits::source::SourceAdapter;
use bridge_traits::storage::{FingerprintStore, PersistencePort};
use bridge_traits::time::{Clock, SystemClock};
use core_async::sync::{watch, CancellationToken, Mutex};
use core_async::task::JoinHandle;
use core_async::time::{interval, Duration, MissedTickBehavior};
use core_runtime::config::SyncSettings;
use core_runtime::events::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

struct SourceEntry {
    adapter: Arc<dyn SourceAdapter>,
    status: Arc<watch::Sender<SyncStatus>>,
    lease: Option<ActiveRun>,
}

struct ActiveRun {
    run_id: RunId,
    cancel: CancellationToken,
}

/// Handle to a started run.
pub struct RunHandle {
    pub run_id: RunId,
    status: watch::Receiver<SyncStatus>,
    join: JoinHandle<SyncStatus>,
}

impl RunHandle {
    /// Status receiver for the run's source, positioned at the run start.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Waits for the run to end and returns its terminal status.
    pub async fn wait(self) -> SyncStatus {
        let run_id = self.run_id;
        match self.join.await {
            Ok(status) => status,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Run supervisor terminated abnormally");
                let latest = self.status.borrow().clone();
                latest
            }
        }
    }
}

/// Sync coordinator
pub struct SyncCoordinator {
    env: RunEnvironment,
    sources: Arc<Mutex<HashMap<SourceId, SourceEntry>>>,
}

impl SyncCoordinator {
    /// Create a new sync coordinator
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if `settings` fail validation.
    pub fn new(
        settings: SyncSettings,
        event_bus: EventBus,
        fingerprints: Arc<dyn FingerprintStore>,
        sink: Arc<dyn PersistencePort>,
    ) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            env: RunEnvironment {
                fingerprints,
                sink,
                pool: FlushPool::new(settings.flush_workers),
                event_bus,
                settings,
                clock: Arc::new(SystemClock),
            },
            sources: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Replaces the wall clock used for phase timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.env.clock = clock;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.env.settings
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.env.event_bus
    }

    /// Registers a source, or replaces the adapter of an idle one.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SyncInProgress`] if the source is running.
    pub async fn register_source(&self, adapter: Arc<dyn SourceAdapter>) -> Result<()> {
        let source_id = adapter.source_id();
        let mut sources = self.sources.lock().await;

        match sources.get_mut(&source_id) {
            Some(entry) if entry.lease.is_some() => {
                return Err(SyncError::SyncInProgress {
                    source_id: source_id.to_string(),
                });
            }
            Some(entry) => {
                entry.adapter = adapter;
                info!(source_id = %source_id, "Replaced catalog source adapter");
            }
            None => {
                let (status, _) = watch::channel(SyncStatus::Idle);
                sources.insert(
                    source_id.clone(),
                    SourceEntry {
                        adapter,
                        status: Arc::new(status),
                        lease: None,
                    },
                );
                info!(source_id = %source_id, "Registered catalog source");
            }
        }

        Ok(())
    }

    /// Registered sources, sorted.
    pub async fn sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<_> = self.sources.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Starts a run for a source.
    ///
    /// # Errors
    ///
    /// - [`SyncError::SourceNotRegistered`] for an unknown source
    /// - [`SyncError::SyncInProgress`] if a run already holds the lease
    #[instrument(skip(self), fields(source_id = %source_id))]
    pub async fn start(&self, source_id: &SourceId) -> Result<RunHandle> {
        let mut sources = self.sources.lock().await;
        let entry = sources
            .get_mut(source_id)
            .ok_or_else(|| SyncError::SourceNotRegistered {
                source_id: source_id.to_string(),
            })?;

        if entry.lease.is_some() {
            return Err(SyncError::SyncInProgress {
                source_id: source_id.to_string(),
            });
        }

        let run_id = RunId::new();
        let cancel = CancellationToken::new();
        entry.lease = Some(ActiveRun {
            run_id,
            cancel: cancel.clone(),
        });

        let status_tx = Arc::clone(&entry.status);
        status_tx.send_replace(SyncStatus::started(source_id));
        let status_rx = status_tx.subscribe();

        let run = SyncRun::new(
            run_id,
            Arc::clone(&entry.adapter),
            self.env.clone(),
            Arc::clone(&status_tx),
            cancel,
        );
        drop(sources);

        let sources = Arc::clone(&self.sources);
        let source = source_id.clone();
        let join = core_async::spawn(async move {
            let terminal = match core_async::spawn(run.execute()).await {
                Ok(status) => status,
                Err(e) => {
                    error!(source_id = %source, run_id = %run_id, error = %e, "Sync run panicked");
                    let summary = SyncSummary::empty(source.clone(), run_id, SyncStrategy::Full);
                    SyncStatus::Failed {
                        error: RunFailure::new(
                            FailureKind::Fault,
                            format!("run task failed: {}", e),
                            summary,
                        ),
                    }
                }
            };

            {
                let mut sources = sources.lock().await;
                if let Some(entry) = sources.get_mut(&source) {
                    if entry.lease.as_ref().map(|lease| lease.run_id) == Some(run_id) {
                        entry.lease = None;
                    }
                }
            }

            status_tx.send_replace(terminal.clone());
            debug!(source_id = %source, run_id = %run_id, "Run lease released");
            terminal
        });

        info!(run_id = %run_id, "Started catalog sync");

        Ok(RunHandle {
            run_id,
            status: status_rx,
            join,
        })
    }

    /// Requests cancellation of the source's active run.
    ///
    /// The run stops pulling events, drains what it can within the cancel
    /// grace period and ends as `Failed { Cancelled }`.
    #[instrument(skip(self), fields(source_id = %source_id))]
    pub async fn cancel(&self, source_id: &SourceId) -> Result<RunId> {
        let sources = self.sources.lock().await;
        let entry = sources
            .get(source_id)
            .ok_or_else(|| SyncError::SourceNotRegistered {
                source_id: source_id.to_string(),
            })?;

        let lease = entry.lease.as_ref().ok_or_else(|| SyncError::NoActiveRun {
            source_id: source_id.to_string(),
        })?;

        lease.cancel.cancel();
        info!(run_id = %lease.run_id, "Cancellation requested");
        Ok(lease.run_id)
    }

    pub async fn is_running(&self, source_id: &SourceId) -> bool {
        self.sources
            .lock()
            .await
            .get(source_id)
            .map(|entry| entry.lease.is_some())
            .unwrap_or(false)
    }

    /// Latest status of a source. Past values are not replayed.
    pub async fn subscribe(&self, source_id: &SourceId) -> Result<watch::Receiver<SyncStatus>> {
        self.sources
            .lock()
            .await
            .get(source_id)
            .map(|entry| entry.status.subscribe())
            .ok_or_else(|| SyncError::SourceNotRegistered {
                source_id: source_id.to_string(),
            })
    }

    pub async fn status(&self, source_id: &SourceId) -> Option<SyncStatus> {
        self.sources
            .lock()
            .await
            .get(source_id)
            .map(|entry| entry.status.borrow().clone())
    }

    /// Starts a run every `period` until `stop` is cancelled.
    ///
    /// Ticks that find the source already running are skipped.
    pub fn schedule_periodic(
        self: &Arc<Self>,
        source_id: SourceId,
        period: Duration,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);

        core_async::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                core_async::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match coordinator.start(&source_id).await {
                    Ok(handle) => debug!(source_id = %source_id, run_id = %handle.run_id, "Scheduled sync started"),
                    Err(SyncError::SyncInProgress { .. }) => {
                        debug!(source_id = %source_id, "Scheduled sync skipped, run in flight")
                    }
                    Err(e) => {
                        warn!(source_id = %source_id, error = %e, "Scheduled sync could not start");
                        break;
                    }
                }
            }

            debug!(source_id = %source_id, "Periodic sync stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryFingerprintStore;
    use async_trait::async_trait;
    use bridge_traits::catalog::{
        CatalogEvent, CatalogEventStream, CatalogItem, Fingerprint, ScanSummary, SourceKind,
    };
    use bridge_traits::error::Result as BridgeResult;
    use core_async::time::timeout;
    use futures::stream::{self, StreamExt};

    struct HangingSource;

    #[async_trait]
    impl SourceAdapter for HangingSource {
        fn source_id(&self) -> SourceId {
            SourceId::from("hanging")
        }

        fn kind(&self) -> SourceKind {
            SourceKind::ListingApi
        }

        fn phase_labels(&self) -> &'static [&'static str] {
            &["live"]
        }

        async fn compute_fingerprint(&self) -> BridgeResult<Fingerprint> {
            Ok(Fingerprint::new("fp"))
        }

        fn scan(&self, _strategy: SyncStrategy) -> CatalogEventStream {
            stream::iter(vec![CatalogEvent::ScanningInitial])
                .chain(stream::pending())
                .boxed()
        }
    }

    struct QuickSource;

    #[async_trait]
    impl SourceAdapter for QuickSource {
        fn source_id(&self) -> SourceId {
            SourceId::from("quick")
        }

        fn kind(&self) -> SourceKind {
            SourceKind::ListingApi
        }

        fn phase_labels(&self) -> &'static [&'static str] {
            &["live"]
        }

        async fn compute_fingerprint(&self) -> BridgeResult<Fingerprint> {
            Ok(Fingerprint::new("fp"))
        }

        fn scan(&self, _strategy: SyncStrategy) -> CatalogEventStream {
            stream::iter(vec![
                CatalogEvent::ItemDiscovered {
                    item: CatalogItem::new("1", "live", "One"),
                },
                CatalogEvent::ScanCompleted {
                    summary: ScanSummary { items_emitted: 1 },
                },
            ])
            .boxed()
        }
    }

    struct NullSink;

    #[async_trait]
    impl PersistencePort for NullSink {
        async fn flush_batch(&self, _source: &SourceId, _items: &[CatalogItem]) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn coordinator() -> SyncCoordinator {
        SyncCoordinator::new(
            SyncSettings::default(),
            EventBus::new(64),
            Arc::new(InMemoryFingerprintStore::new()),
            Arc::new(NullSink),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let result = SyncCoordinator::new(
            SyncSettings::default().with_max_batch_size(0),
            EventBus::new(8),
            Arc::new(InMemoryFingerprintStore::new()),
            Arc::new(NullSink),
        );
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[core_async::test]
    async fn test_unknown_source() {
        let coordinator = coordinator();
        let source = SourceId::from("missing");

        assert!(matches!(
            coordinator.start(&source).await,
            Err(SyncError::SourceNotRegistered { .. })
        ));
        assert!(coordinator.status(&source).await.is_none());
        assert!(!coordinator.is_running(&source).await);
    }

    #[core_async::test]
    async fn test_registered_source_is_idle() {
        let coordinator = coordinator();
        coordinator.register_source(Arc::new(QuickSource)).await.unwrap();

        assert_eq!(coordinator.sources().await, vec![SourceId::from("quick")]);
        assert_eq!(
            coordinator.status(&SourceId::from("quick")).await,
            Some(SyncStatus::Idle)
        );
    }

    #[core_async::test]
    async fn test_lease_released_after_run() {
        let coordinator = coordinator();
        coordinator.register_source(Arc::new(QuickSource)).await.unwrap();
        let source = SourceId::from("quick");

        let status = coordinator.start(&source).await.unwrap().wait().await;
        assert!(matches!(status, SyncStatus::Completed { .. }));
        assert!(!coordinator.is_running(&source).await);

        // Fingerprint unchanged: the next run skips.
        let status = coordinator.start(&source).await.unwrap().wait().await;
        match status {
            SyncStatus::Completed { summary } => assert_eq!(summary.strategy, SyncStrategy::Skip),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[core_async::test]
    async fn test_cancel_without_run() {
        let coordinator = coordinator();
        coordinator.register_source(Arc::new(QuickSource)).await.unwrap();

        assert!(matches!(
            coordinator.cancel(&SourceId::from("quick")).await,
            Err(SyncError::NoActiveRun { .. })
        ));
    }

    #[core_async::test]
    async fn test_cannot_replace_running_adapter() {
        let coordinator = coordinator();
        coordinator.register_source(Arc::new(HangingSource)).await.unwrap();
        let source = SourceId::from("hanging");

        let handle = coordinator.start(&source).await.unwrap();
        assert!(coordinator.is_running(&source).await);
        assert!(matches!(
            coordinator.register_source(Arc::new(HangingSource)).await,
            Err(SyncError::SyncInProgress { .. })
        ));

        let cancelled = coordinator.cancel(&source).await.unwrap();
        assert_eq!(cancelled, handle.run_id);

        let status = timeout(Duration::from_secs(5), handle.wait()).await.unwrap();
        match status {
            SyncStatus::Failed { error } => assert_eq!(error.kind, FailureKind::Cancelled),
            other => panic!("unexpected status {:?}", other),
        }
        assert!(!coordinator.is_running(&source).await);
    }

    #[core_async::test]
    async fn test_schedule_periodic_stops() {
        let coordinator = Arc::new(coordinator());
        coordinator.register_source(Arc::new(QuickSource)).await.unwrap();

        let stop = CancellationToken::new();
        let task = coordinator.schedule_periodic(
            SourceId::from("quick"),
            Duration::from_millis(10),
            stop.clone(),
        );

        let mut status = coordinator.subscribe(&SourceId::from("quick")).await.unwrap();
        timeout(Duration::from_secs(5), status.wait_for(|s| s.is_terminal()))
            .await
            .unwrap()
            .unwrap();

        stop.cancel();
        timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
