//! # Sync Orchestrator
//!
//! Drives one [`SyncRun`] from decision to terminal status.
//!
//! ## Workflow
//!
//! 1. Read the previous fingerprint and compute a fresh one
//! 2. Decide `Full`, `Incremental` or `Skip`
//! 3. On `Skip`, complete immediately without touching the adapter stream
//! 4. Otherwise pull events in order and dispatch each to its handler,
//!    publishing status after every `Continue`
//! 5. Finalize on `Complete` / `Fail`
//!
//! While waiting for the next event the run also watches, in priority order:
//! the cancellation token, the run deadline, the open batch's linger deadline
//! and the idle window.

use crate::batch_router::{BatchRouter, FlushPool};
use crate::decider;
use crate::handlers::{fail_run, HandlerRegistry, SyncContext};
use crate::metrics::PhaseMetricsRecorder;
use crate::run::{RunId, RunLifecycle, RunState};
use crate::state::{FailureKind, RunFailure, SyncResult, SyncState, SyncStatus, SyncSummary};
use bridge_traits::catalog::{Fingerprint, Phase, SourceId, SyncStrategy};
use bridge_traits::source::SourceAdapter;
use bridge_traits::storage::{FingerprintStore, PersistencePort};
use bridge_traits::time::Clock;
use core_async::sync::{watch, CancellationToken};
use core_async::time::{sleep_until_instant, Duration, Instant};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Minimum spacing of `SyncEvent::Progress` within one phase.
const PROGRESS_EVENT_INTERVAL: Duration = Duration::from_millis(250);

/// Collaborators shared by every run of a coordinator.
#[derive(Clone)]
pub struct RunEnvironment {
    pub fingerprints: Arc<dyn FingerprintStore>,
    pub sink: Arc<dyn PersistencePort>,
    pub pool: FlushPool,
    pub event_bus: EventBus,
    pub settings: SyncSettings,
    pub clock: Arc<dyn Clock>,
}

/// Why the event loop stopped pulling.
enum LoopExit {
    Completed(SyncSummary),
    Failed(RunFailure),
    Interrupted(FailureKind),
}

/// A single synchronization attempt. Consumed by [`SyncRun::execute`].
pub struct SyncRun {
    run_id: RunId,
    source_id: SourceId,
    adapter: Arc<dyn SourceAdapter>,
    env: RunEnvironment,
    status: Arc<watch::Sender<SyncStatus>>,
    cancel: CancellationToken,
    lifecycle: RunLifecycle,
    started: Instant,
}

impl SyncRun {
    pub fn new(
        run_id: RunId,
        adapter: Arc<dyn SourceAdapter>,
        env: RunEnvironment,
        status: Arc<watch::Sender<SyncStatus>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            source_id: adapter.source_id(),
            adapter,
            env,
            status,
            cancel,
            lifecycle: RunLifecycle::new(run_id),
            started: Instant::now(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Runs to completion and returns the terminal status.
    ///
    /// Intermediate statuses are published on the run's watch channel; the
    /// terminal one is left to the caller so it can release the source lease
    /// first.
    #[instrument(skip(self), fields(run_id = %self.run_id, source_id = %self.source_id))]
    pub async fn execute(mut self) -> SyncStatus {
        self.started = Instant::now();
        self.advance(RunState::Deciding);

        let previous = match self.env.fingerprints.get(&self.source_id).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "Failed to read previous fingerprint, forcing full scan");
                None
            }
        };

        let fresh = core_async::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            fresh = self.adapter.compute_fingerprint() => Some(fresh),
        };
        let fresh = match fresh {
            None => {
                return self.fail_before_scan(FailureKind::Cancelled, "cancelled while deciding");
            }
            Some(Ok(fresh)) => fresh,
            Some(Err(e)) => {
                let message = format!("failed to compute fingerprint: {}", e);
                return self.fail_before_scan(FailureKind::Scan, message);
            }
        };

        let strategy = decider::decide(previous.as_ref(), &fresh, self.adapter.supports_diff());
        info!(strategy = %strategy, "Sync strategy decided");

        if strategy == SyncStrategy::Skip {
            return self.skip();
        }

        let registry = match HandlerRegistry::for_adapter(self.adapter.as_ref()) {
            Ok(registry) => registry,
            Err(e) => return self.fail_before_scan(FailureKind::Fault, e.to_string()),
        };

        self.scan(strategy, fresh, registry).await
    }

    fn skip(mut self) -> SyncStatus {
        self.advance(RunState::Skipped);
        self.emit(SyncEvent::Skipped {
            run_id: self.run_id.to_string(),
            source_id: self.source_id.to_string(),
        });
        self.advance(RunState::Completed);

        let mut summary = self.empty_summary(SyncStrategy::Skip);
        summary.duration_ms = self.elapsed_ms();
        info!("Catalog unchanged, sync skipped");
        self.complete(summary)
    }

    async fn scan(
        mut self,
        strategy: SyncStrategy,
        fresh: Fingerprint,
        registry: HandlerRegistry,
    ) -> SyncStatus {
        self.advance(RunState::Scanning);
        self.emit(SyncEvent::Started {
            run_id: self.run_id.to_string(),
            source_id: self.source_id.to_string(),
            strategy: strategy.to_string(),
        });

        let settings = self.env.settings.clone();
        let mut ctx = SyncContext {
            run_id: self.run_id,
            source_id: self.source_id.clone(),
            strategy,
            metrics: PhaseMetricsRecorder::new(self.source_id.clone(), Arc::clone(&self.env.clock)),
            router: BatchRouter::new(
                self.source_id.clone(),
                &settings,
                Arc::clone(&self.env.sink),
                self.env.pool.clone(),
                self.env.event_bus.clone(),
            ),
            fingerprints: Arc::clone(&self.env.fingerprints),
            fresh_fingerprint: fresh,
            event_bus: self.env.event_bus.clone(),
            settings: settings.clone(),
            started: self.started,
            adapter_summary: None,
        };

        let mut state = SyncState::new(strategy);
        let mut stream = self.adapter.scan(strategy);
        let run_deadline = settings.run_timeout.map(|limit| self.started + limit);
        let mut progress = ProgressThrottle::default();

        let exit = loop {
            let linger_deadline = ctx.router.linger_deadline();
            // The idle window covers only the wait below, not dispatch or flushing.
            let idle_deadline = Instant::now() + settings.idle_timeout;

            core_async::select! {
                biased;
                _ = self.cancel.cancelled() => break LoopExit::Interrupted(FailureKind::Cancelled),
                _ = wait_until(run_deadline) => break LoopExit::Interrupted(FailureKind::TimedOut),
                _ = wait_until(linger_deadline) => {
                    if let Err(e) = ctx.router.flush_due().await {
                        error!(error = %e, "Linger flush failed");
                    }
                }
                next = stream.next() => {
                    let Some(event) = next else {
                        let cause = "event stream ended without a terminal event";
                        let error = fail_run(FailureKind::Scan, cause, state.clone(), &mut ctx).await;
                        break LoopExit::Failed(error);
                    };

                    debug!(event = event.name(), "Dispatching catalog event");

                    match registry.dispatch(event, state.clone(), &mut ctx).await {
                        SyncResult::Continue { state: next, status } => {
                            if progress.should_emit(next.current_phase) {
                                self.emit(SyncEvent::Progress {
                                    run_id: self.run_id.to_string(),
                                    source_id: self.source_id.to_string(),
                                    phase: next.current_phase.map(|phase| phase.to_string()),
                                    items_discovered: next.total_discovered(),
                                    items_persisted: next.items_persisted,
                                });
                            }
                            self.status.send_replace(status);
                            state = next;
                        }
                        SyncResult::Complete { summary } => break LoopExit::Completed(summary),
                        SyncResult::Fail { error } => break LoopExit::Failed(error),
                    }
                }
                _ = sleep_until_instant(idle_deadline) => {
                    let idle_ms = settings.idle_timeout.as_millis() as u64;
                    warn!(idle_ms, "Adapter stalled");
                    let cause = format!("no event received for {} ms", idle_ms);
                    let error = fail_run(FailureKind::Stalled, cause, state.clone(), &mut ctx).await;
                    break LoopExit::Failed(error);
                }
            }
        };
        drop(stream);

        self.advance(RunState::Finalizing);

        match exit {
            LoopExit::Completed(summary) => {
                self.advance(RunState::Completed);
                self.complete(summary)
            }
            LoopExit::Failed(error) => {
                self.advance(RunState::Failed);
                self.fail(error)
            }
            LoopExit::Interrupted(kind) => {
                let items = ctx
                    .metrics
                    .active_phase()
                    .map(|phase| state.items_discovered.get(phase))
                    .unwrap_or(0);
                ctx.metrics.abort_active(items);

                let report = ctx.router.drain_within(settings.cancel_grace).await;
                let summary = ctx.summary(&state, &report, false);
                let message = match kind {
                    FailureKind::TimedOut => format!(
                        "run exceeded {} ms",
                        settings.run_timeout.unwrap_or_default().as_millis()
                    ),
                    _ => "run cancelled".to_string(),
                };

                self.advance(RunState::Failed);
                self.fail(RunFailure::new(kind, message, summary))
            }
        }
    }

    fn fail_before_scan(mut self, kind: FailureKind, message: impl Into<String>) -> SyncStatus {
        self.advance(RunState::Failed);
        let mut summary = self.empty_summary(SyncStrategy::Full);
        summary.duration_ms = self.elapsed_ms();
        self.fail(RunFailure::new(kind, message, summary))
    }

    fn complete(&self, summary: SyncSummary) -> SyncStatus {
        info!(
            strategy = %summary.strategy,
            items_discovered = summary.items_discovered,
            items_persisted = summary.items_persisted,
            items_failed = summary.items_failed,
            fingerprint_committed = summary.fingerprint_committed,
            duration_ms = summary.duration_ms,
            "Sync completed"
        );
        self.emit(SyncEvent::Completed {
            run_id: self.run_id.to_string(),
            source_id: self.source_id.to_string(),
            items_discovered: summary.items_discovered,
            items_persisted: summary.items_persisted,
            items_failed: summary.items_failed,
            fingerprint_committed: summary.fingerprint_committed,
            duration_ms: summary.duration_ms,
        });
        SyncStatus::Completed { summary }
    }

    fn fail(&self, error: RunFailure) -> SyncStatus {
        warn!(
            kind = %error.kind,
            items_persisted = error.summary.items_persisted,
            items_failed = error.summary.items_failed,
            "Sync failed: {}",
            error.message
        );
        self.emit(SyncEvent::Failed {
            run_id: self.run_id.to_string(),
            source_id: self.source_id.to_string(),
            kind: error.kind.to_string(),
            message: error.message.clone(),
            items_persisted: error.summary.items_persisted,
        });
        SyncStatus::Failed { error }
    }

    fn advance(&mut self, to: RunState) {
        if let Err(e) = self.lifecycle.advance(to) {
            error!(error = %e, "Run state machine rejected transition");
        }
    }

    fn empty_summary(&self, strategy: SyncStrategy) -> SyncSummary {
        SyncSummary::empty(self.source_id.clone(), self.run_id, strategy)
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn emit(&self, event: SyncEvent) {
        self.env.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

/// Completes at `deadline`, or never.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until_instant(deadline).await,
        None => futures::future::pending::<()>().await,
    }
}

/// Rate limit for progress events; phase changes always pass.
#[derive(Default)]
struct ProgressThrottle {
    last_emit: Option<Instant>,
    last_phase: Option<Phase>,
}

impl ProgressThrottle {
    fn should_emit(&mut self, phase: Option<Phase>) -> bool {
        let now = Instant::now();
        let due = match self.last_emit {
            None => true,
            Some(last) => phase != self.last_phase || now.duration_since(last) >= PROGRESS_EVENT_INTERVAL,
        };
        if due {
            self.last_emit = Some(now);
            self.last_phase = phase;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_throttle() {
        let mut throttle = ProgressThrottle::default();
        assert!(throttle.should_emit(None));
        assert!(!throttle.should_emit(None));
        assert!(throttle.should_emit(Some(Phase::Live)));
        assert!(!throttle.should_emit(Some(Phase::Live)));
        assert!(throttle.should_emit(Some(Phase::Movies)));
    }
}
