//! # Catalog Sync Module
//!
//! Incremental synchronization of external media catalogs into local storage.
//!
//! ## Overview
//!
//! Each registered source (an IPTV-style listing API account, a chat-history
//! media archive) is synchronized independently:
//! - A cheap fingerprint of the remote catalog decides whether a run scans in
//!   full, incrementally, or not at all
//! - The adapter's event stream is pulled in order and dispatched to one
//!   handler per event kind
//! - Discovered items are persisted in bounded batches with retry, without
//!   blocking discovery
//! - The fingerprint is committed only when a scan completes
//!
//! ## Components
//!
//! - **Decider** (`decider`): Pure `Full` / `Incremental` / `Skip` decision
//! - **Phase Table** (`phase_table`): Adapter phase labels mapped to [`Phase`](bridge_traits::catalog::Phase)
//! - **Handlers** (`handlers`): Exhaustive dispatch over catalog events
//! - **Batch Router** (`batch_router`): Size/time bounded batching with a single-flight flush worker
//! - **Metrics** (`metrics`): Per-phase timing and volume
//! - **Run State Machine** (`run`): Validated run lifecycle
//! - **Orchestrator** (`orchestrator`): Drives one run to a terminal status
//! - **Coordinator** (`coordinator`): Per-source leases, cancellation, status and scheduling
//! - **Repository** (`repository`): SQLite and in-memory fingerprint stores

pub mod batch_router;
pub mod coordinator;
pub mod decider;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod orchestrator;
pub mod phase_table;
pub mod repository;
pub mod run;
pub mod state;

pub use batch_router::{BatchRouter, FlushPool, FlushReport, FlushStats, SubmitOutcome};
pub use coordinator::{RunHandle, SyncCoordinator};
pub use decider::decide;
pub use error::{Result, SyncError};
pub use handlers::{HandlerRegistry, SyncContext};
pub use metrics::PhaseMetricsRecorder;
pub use orchestrator::{RunEnvironment, SyncRun};
pub use phase_table::PhaseTable;
pub use repository::{InMemoryFingerprintStore, SqliteFingerprintStore};
pub use run::{RunId, RunLifecycle, RunState};
pub use state::{
    FailureKind, PhaseCounts, PhaseOutcome, PhaseReport, RunFailure, SyncResult, SyncState,
    SyncStatus, SyncSummary,
};
