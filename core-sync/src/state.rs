//! # Run State & Results
//!
//! Value types that flow through a run: the immutable [`SyncState`] snapshot
//! handlers pass along, the [`SyncResult`] they return, the observable
//! [`SyncStatus`], and the terminal [`SyncSummary`] / [`RunFailure`].

use crate::run::RunId;
use bridge_traits::catalog::{Phase, SourceId, SyncStrategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Per-phase Counters
// ============================================================================

/// One counter per [`Phase`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts([u64; 4]);

impl PhaseCounts {
    pub fn get(&self, phase: Phase) -> u64 {
        self.0[phase.index()]
    }

    /// Returns a copy with `phase` increased by `by`.
    pub fn add(mut self, phase: Phase, by: u64) -> Self {
        self.0[phase.index()] += by;
        self
    }

    /// Returns a copy with `phase` set to `value`.
    pub fn set(mut self, phase: Phase, value: u64) -> Self {
        self.0[phase.index()] = value;
        self
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }
}

// ============================================================================
// Sync State
// ============================================================================

/// Immutable snapshot of one run's progress.
///
/// Handlers receive a state by value and return a replacement; nothing
/// mutates a state in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub current_phase: Option<Phase>,
    /// Unique items forwarded to the batch router, per phase.
    pub items_discovered: PhaseCounts,
    /// Latest per-phase totals announced by the adapter's progress pings.
    pub items_reported: PhaseCounts,
    /// Items confirmed by the persistence port so far.
    pub items_persisted: u64,
    /// Items whose key was already seen in this run.
    pub duplicates_skipped: u64,
    pub strategy: SyncStrategy,
}

impl SyncState {
    pub fn new(strategy: SyncStrategy) -> Self {
        Self {
            current_phase: None,
            items_discovered: PhaseCounts::default(),
            items_reported: PhaseCounts::default(),
            items_persisted: 0,
            duplicates_skipped: 0,
            strategy,
        }
    }

    pub fn with_phase(self, phase: Phase) -> Self {
        Self {
            current_phase: Some(phase),
            ..self
        }
    }

    pub fn with_discovered(self, phase: Phase) -> Self {
        Self {
            items_discovered: self.items_discovered.add(phase, 1),
            ..self
        }
    }

    pub fn with_reported(self, phase: Phase, total: u64) -> Self {
        Self {
            items_reported: self.items_reported.set(phase, total),
            ..self
        }
    }

    pub fn with_duplicate(self) -> Self {
        Self {
            duplicates_skipped: self.duplicates_skipped + 1,
            ..self
        }
    }

    pub fn with_persisted(self, items_persisted: u64) -> Self {
        Self {
            items_persisted,
            ..self
        }
    }

    pub fn total_discovered(&self) -> u64 {
        self.items_discovered.total()
    }

    /// Status snapshot for observers.
    pub fn in_progress(&self, source_id: &SourceId) -> SyncStatus {
        SyncStatus::InProgress {
            source_id: source_id.clone(),
            items_discovered: self.total_discovered(),
            items_persisted: self.items_persisted,
            current_phase: self.current_phase,
        }
    }
}

// ============================================================================
// Handler Result
// ============================================================================

/// Outcome of handling one event. Never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncResult {
    Continue { state: SyncState, status: SyncStatus },
    Complete { summary: SyncSummary },
    Fail { error: RunFailure },
}

// ============================================================================
// Observable Status
// ============================================================================

/// Per-source status, published last-value-wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    InProgress {
        source_id: SourceId,
        items_discovered: u64,
        items_persisted: u64,
        current_phase: Option<Phase>,
    },
    Completed {
        summary: SyncSummary,
    },
    Failed {
        error: RunFailure,
    },
}

impl SyncStatus {
    /// Zeroed progress, published as soon as a run starts.
    pub fn started(source_id: &SourceId) -> Self {
        SyncStatus::InProgress {
            source_id: source_id.clone(),
            items_discovered: 0,
            items_persisted: 0,
            current_phase: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed { .. } | SyncStatus::Failed { .. })
    }

    pub fn summary(&self) -> Option<&SyncSummary> {
        match self {
            SyncStatus::Completed { summary } => Some(summary),
            SyncStatus::Failed { error } => Some(&error.summary),
            _ => None,
        }
    }
}

// ============================================================================
// Summaries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseOutcome {
    Completed,
    Aborted,
}

/// Timing and volume of one visited phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub items: u64,
    pub outcome: PhaseOutcome,
}

/// Totals of one run.
///
/// For every terminal run `items_persisted + items_failed == items_discovered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub source_id: SourceId,
    pub run_id: RunId,
    pub strategy: SyncStrategy,
    pub items_discovered: u64,
    pub items_persisted: u64,
    pub items_failed: u64,
    pub duplicates_skipped: u64,
    pub batches_flushed: u64,
    pub batches_failed: u64,
    /// What the adapter claimed in `ScanCompleted`, if it got that far.
    pub items_reported_by_source: Option<u64>,
    pub phases: Vec<PhaseReport>,
    pub fingerprint_committed: bool,
    pub duration_ms: u64,
}

impl SyncSummary {
    /// Summary of a run that wrote nothing.
    pub fn empty(source_id: SourceId, run_id: RunId, strategy: SyncStrategy) -> Self {
        Self {
            source_id,
            run_id,
            strategy,
            items_discovered: 0,
            items_persisted: 0,
            items_failed: 0,
            duplicates_skipped: 0,
            batches_flushed: 0,
            batches_failed: 0,
            items_reported_by_source: None,
            phases: Vec::new(),
            fingerprint_committed: false,
            duration_ms: 0,
        }
    }
}

// ============================================================================
// Failures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The adapter reported a scan error.
    Scan,
    /// The adapter went silent for longer than the idle timeout.
    Stalled,
    /// The run was cancelled through the control surface.
    Cancelled,
    /// The run exceeded its deadline.
    TimedOut,
    /// Contract violation or panic inside the run.
    Fault,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Scan => "scan",
            FailureKind::Stalled => "stalled",
            FailureKind::Cancelled => "cancelled",
            FailureKind::TimedOut => "timed_out",
            FailureKind::Fault => "fault",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a run, with whatever was achieved before it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
    pub summary: SyncSummary,
}

impl RunFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>, summary: SyncSummary) -> Self {
        Self {
            kind,
            message: message.into(),
            summary,
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
