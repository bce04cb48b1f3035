//! # Event Handlers
//!
//! One handler per [`CatalogEvent`] variant, selected by an exhaustive `match`.
//!
//! Handlers receive the current [`SyncState`] by value and return a
//! [`SyncResult`]. Everything that outlives a single event (batch router,
//! phase metrics, fingerprint store) lives in the run's [`SyncContext`].

use crate::batch_router::{BatchRouter, FlushReport, SubmitOutcome};
use crate::metrics::PhaseMetricsRecorder;
use crate::phase_table::PhaseTable;
use crate::run::RunId;
use crate::state::{FailureKind, RunFailure, SyncResult, SyncState, SyncStatus, SyncSummary};
use crate::{Result, SyncError};
use bridge_traits::catalog::{
    CatalogEvent, CatalogItem, Fingerprint, Phase, ScanSummary, SourceId, SyncStrategy,
};
use bridge_traits::source::SourceAdapter;
use bridge_traits::storage::FingerprintStore;
use core_async::time::Instant;
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// Run Context
// ============================================================================

/// Run-scoped collaborators shared by every handler invocation.
pub struct SyncContext {
    pub run_id: RunId,
    pub source_id: SourceId,
    pub strategy: SyncStrategy,
    pub metrics: PhaseMetricsRecorder,
    pub router: BatchRouter,
    pub fingerprints: Arc<dyn FingerprintStore>,
    /// Committed when the scan completes.
    pub fresh_fingerprint: Fingerprint,
    pub event_bus: EventBus,
    pub settings: SyncSettings,
    pub started: Instant,
    /// Set once the adapter reports `ScanCompleted`.
    pub adapter_summary: Option<ScanSummary>,
}

impl SyncContext {
    /// Builds the run summary from the final state and flush accounting.
    ///
    /// Items that never reached a terminal flush outcome count as failed.
    pub fn summary(
        &self,
        state: &SyncState,
        report: &FlushReport,
        fingerprint_committed: bool,
    ) -> SyncSummary {
        SyncSummary {
            source_id: self.source_id.clone(),
            run_id: self.run_id,
            strategy: self.strategy,
            items_discovered: report.submitted,
            items_persisted: report.persisted,
            items_failed: report.failed + report.discarded,
            duplicates_skipped: state.duplicates_skipped,
            batches_flushed: report.batches_flushed,
            batches_failed: report.batches_failed,
            items_reported_by_source: self
                .adapter_summary
                .as_ref()
                .map(|summary| summary.items_emitted),
            phases: self.metrics.reports().to_vec(),
            fingerprint_committed,
            duration_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    /// Items discovered so far in the active phase.
    fn active_phase_items(&self, state: &SyncState) -> u64 {
        self.metrics
            .active_phase()
            .map(|phase| state.items_discovered.get(phase))
            .unwrap_or(0)
    }

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

// ============================================================================
// Handler Registry
// ============================================================================

/// Dispatches adapter events for one source.
#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    table: PhaseTable,
}

impl HandlerRegistry {
    /// Builds a registry, checking that every declared label is mapped.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnmappedPhase`] for the first declared label the
    /// table cannot resolve.
    pub fn new(table: PhaseTable, declared_labels: &[&str], source_id: &SourceId) -> Result<Self> {
        if let Some(label) = declared_labels
            .iter()
            .find(|label| table.resolve(label).is_none())
        {
            return Err(SyncError::UnmappedPhase {
                label: label.to_string(),
                source_id: source_id.to_string(),
            });
        }

        Ok(Self { table })
    }

    /// Registry using the built-in table for the adapter's source family.
    pub fn for_adapter(adapter: &dyn SourceAdapter) -> Result<Self> {
        Self::new(
            PhaseTable::for_kind(adapter.kind()),
            adapter.phase_labels(),
            &adapter.source_id(),
        )
    }

    pub async fn dispatch(
        &self,
        event: CatalogEvent,
        state: SyncState,
        ctx: &mut SyncContext,
    ) -> SyncResult {
        match event {
            CatalogEvent::ScanningInitial => self.on_scanning_initial(state, ctx),
            CatalogEvent::ScanProgress {
                phase,
                discovered_counts_by_kind,
            } => {
                self.on_progress(&phase, &discovered_counts_by_kind, state, ctx)
                    .await
            }
            CatalogEvent::ItemDiscovered { item } => self.on_item(item, state, ctx).await,
            CatalogEvent::ScanCompleted { summary } => self.on_completed(summary, state, ctx).await,
            CatalogEvent::ScanError { cause } => SyncResult::Fail {
                error: fail_run(FailureKind::Scan, cause, state, ctx).await,
            },
        }
    }

    /// Counters start at zero. A repeated announcement after the scan has
    /// produced anything is ignored; the router and metrics keep running.
    fn on_scanning_initial(&self, state: SyncState, ctx: &SyncContext) -> SyncResult {
        let fresh = SyncState::new(ctx.strategy);
        if state != fresh {
            warn!(
                source_id = %ctx.source_id,
                current_phase = ?state.current_phase,
                items_discovered = state.total_discovered(),
                "Scan announced again mid-run, keeping current state"
            );
            return SyncResult::Continue {
                status: state.in_progress(&ctx.source_id),
                state,
            };
        }

        debug!(source_id = %ctx.source_id, "Scan starting");
        SyncResult::Continue {
            status: SyncStatus::started(&ctx.source_id),
            state: fresh,
        }
    }

    async fn on_progress(
        &self,
        label: &str,
        counts: &BTreeMap<String, u64>,
        state: SyncState,
        ctx: &mut SyncContext,
    ) -> SyncResult {
        let Some(phase) = self.table.resolve(label) else {
            let message = format!("progress for undeclared phase '{}'", label);
            return SyncResult::Fail {
                error: fail_run(FailureKind::Fault, message, state, ctx).await,
            };
        };

        let current_phase = state.current_phase;
        let mut state = match current_phase {
            Some(current) if current == phase => state,
            Some(current) if phase < current => {
                warn!(
                    source_id = %ctx.source_id,
                    phase = %phase,
                    current_phase = %current,
                    "Progress for a superseded phase, keeping current phase"
                );
                state
            }
            _ => enter_phase(phase, state, ctx),
        };

        let mut reported: BTreeMap<Phase, u64> = BTreeMap::new();
        for (kind, count) in counts {
            match self.table.resolve(kind) {
                Some(kind_phase) => *reported.entry(kind_phase).or_default() += count,
                None => debug!(source_id = %ctx.source_id, kind = %kind, "Unmapped count ignored"),
            }
        }
        for (kind_phase, total) in reported {
            state = state.with_reported(kind_phase, total);
        }

        let status = SyncStatus::InProgress {
            source_id: ctx.source_id.clone(),
            items_discovered: counts.values().sum(),
            items_persisted: state.items_persisted,
            current_phase: state.current_phase,
        };

        SyncResult::Continue { state, status }
    }

    async fn on_item(&self, item: CatalogItem, state: SyncState, ctx: &mut SyncContext) -> SyncResult {
        let Some(phase) = self.table.resolve(&item.kind) else {
            let message = format!("item '{}' has undeclared kind '{}'", item.key, item.kind);
            return SyncResult::Fail {
                error: fail_run(FailureKind::Fault, message, state, ctx).await,
            };
        };

        let state = if state.current_phase.is_none() {
            enter_phase(phase, state, ctx)
        } else {
            state
        };

        let state = match ctx.router.submit(item).await {
            Ok(SubmitOutcome::Queued) => state.with_discovered(phase),
            Ok(SubmitOutcome::Duplicate) => state.with_duplicate(),
            Err(e) => {
                return SyncResult::Fail {
                    error: fail_run(FailureKind::Fault, e.to_string(), state, ctx).await,
                }
            }
        };
        let state = state.with_persisted(ctx.router.stats().persisted);

        SyncResult::Continue {
            status: state.in_progress(&ctx.source_id),
            state,
        }
    }

    async fn on_completed(
        &self,
        summary: ScanSummary,
        state: SyncState,
        ctx: &mut SyncContext,
    ) -> SyncResult {
        ctx.adapter_summary = Some(summary);
        let items = ctx.active_phase_items(&state);
        ctx.metrics.finish_active(items);

        let report = match ctx.router.drain().await {
            Ok(report) => report,
            Err(e) => {
                error!(source_id = %ctx.source_id, error = %e, "Final flush failed");
                let report = ctx.router.report();
                let summary = ctx.summary(&state, &report, false);
                return SyncResult::Fail {
                    error: RunFailure::new(FailureKind::Fault, e.to_string(), summary),
                };
            }
        };

        let partial = report.failed + report.discarded > 0;
        let committed = if partial && !ctx.settings.commit_fingerprint_on_partial_failure {
            info!(
                source_id = %ctx.source_id,
                items_failed = report.failed,
                "Fingerprint withheld after partial failure"
            );
            false
        } else {
            commit_fingerprint(ctx).await
        };

        SyncResult::Complete {
            summary: ctx.summary(&state, &report, committed),
        }
    }
}

// ============================================================================
// Shared Steps
// ============================================================================

fn enter_phase(phase: Phase, state: SyncState, ctx: &mut SyncContext) -> SyncState {
    if let Some(previous) = state.current_phase {
        ctx.metrics.finish_active(state.items_discovered.get(previous));
    }

    if ctx.metrics.start_phase(phase) {
        ctx.emit(SyncEvent::PhaseStarted {
            run_id: ctx.run_id.to_string(),
            source_id: ctx.source_id.to_string(),
            phase: phase.to_string(),
        });
    }

    state.with_phase(phase)
}

async fn commit_fingerprint(ctx: &SyncContext) -> bool {
    match ctx
        .fingerprints
        .set(&ctx.source_id, &ctx.fresh_fingerprint)
        .await
    {
        Ok(()) => {
            debug!(source_id = %ctx.source_id, fingerprint = %ctx.fresh_fingerprint.as_str(), "Fingerprint committed");
            true
        }
        Err(e) => {
            warn!(source_id = %ctx.source_id, error = %e, "Failed to commit fingerprint");
            false
        }
    }
}

/// Aborts phase metrics, drains queued batches and fails the run.
///
/// The fingerprint is never committed. A drain error does not change the
/// failure kind.
pub(crate) async fn fail_run(
    kind: FailureKind,
    message: impl Into<String>,
    state: SyncState,
    ctx: &mut SyncContext,
) -> RunFailure {
    let message = message.into();
    let items = ctx.active_phase_items(&state);
    ctx.metrics.abort_active(items);

    let report = match ctx.router.drain().await {
        Ok(report) => report,
        Err(e) => {
            warn!(source_id = %ctx.source_id, error = %e, "Final flush failed while aborting run");
            ctx.router.report()
        }
    };

    RunFailure::new(kind, message, ctx.summary(&state, &report, false))
}
