//! # Sync Run State Machine
//!
//! Validated lifecycle of a single synchronization run.
//!
//! ## State Machine
//!
//! ```text
//! NotStarted → Deciding → Skipped ──→ Completed
//!                  │                     ↑
//!                  ├──→ Scanning → Finalizing
//!                  │                     ↓
//!                  └───────────────→  Failed
//! ```
//!
//! `Completed` and `Failed` are terminal. A run is never restarted; every
//! trigger builds a fresh run with a fresh [`RunId`].

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a run ID from a string
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::Handler(format!("invalid run id '{}': {}", s, e)))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Run States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    /// Reading the previous fingerprint and computing a fresh one
    Deciding,
    /// Fingerprint unchanged
    Skipped,
    /// Consuming adapter events
    Scanning,
    /// Draining batches and committing the fingerprint
    Finalizing,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::NotStarted => "not_started",
            RunState::Deciding => "deciding",
            RunState::Skipped => "skipped",
            RunState::Scanning => "scanning",
            RunState::Finalizing => "finalizing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current [`RunState`] and rejects invalid transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLifecycle {
    run_id: RunId,
    state: RunState,
}

impl RunLifecycle {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            state: RunState::NotStarted,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Moves to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] if the move is not an
    /// edge of the state machine.
    pub fn advance(&mut self, to: RunState) -> Result<()> {
        self.validate_transition(to)?;
        tracing::trace!(run_id = %self.run_id, from = %self.state, to = %to, "Run state transition");
        self.state = to;
        Ok(())
    }

    fn validate_transition(&self, to: RunState) -> Result<()> {
        let valid = match (self.state, to) {
            (RunState::NotStarted, RunState::Deciding) => true,

            (RunState::Deciding, RunState::Skipped) => true,
            (RunState::Deciding, RunState::Scanning) => true,
            (RunState::Deciding, RunState::Failed) => true,

            (RunState::Skipped, RunState::Completed) => true,

            (RunState::Scanning, RunState::Finalizing) => true,

            (RunState::Finalizing, RunState::Completed) => true,
            (RunState::Finalizing, RunState::Failed) => true,

            // Terminal states cannot transition
            (RunState::Completed, _) | (RunState::Failed, _) => false,

            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.state.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_new_is_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn test_run_id_from_string() {
        let uuid_str = "550e8400-e29b-41d4-a716-446655440000";
        let id = RunId::from_string(uuid_str).unwrap();
        assert_eq!(id.to_string(), uuid_str);
        assert!(RunId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_scan_path() {
        let mut run = RunLifecycle::new(RunId::new());
        run.advance(RunState::Deciding).unwrap();
        run.advance(RunState::Scanning).unwrap();
        run.advance(RunState::Finalizing).unwrap();
        run.advance(RunState::Completed).unwrap();
        assert!(run.state().is_terminal());
    }

    #[test]
    fn test_skip_path() {
        let mut run = RunLifecycle::new(RunId::new());
        run.advance(RunState::Deciding).unwrap();
        run.advance(RunState::Skipped).unwrap();
        run.advance(RunState::Completed).unwrap();
        assert_eq!(run.state(), RunState::Completed);
    }

    #[test]
    fn test_deciding_can_fail() {
        let mut run = RunLifecycle::new(RunId::new());
        run.advance(RunState::Deciding).unwrap();
        run.advance(RunState::Failed).unwrap();
        assert_eq!(run.state(), RunState::Failed);
    }

    #[test]
    fn test_scanning_must_finalize() {
        let mut run = RunLifecycle::new(RunId::new());
        run.advance(RunState::Deciding).unwrap();
        run.advance(RunState::Scanning).unwrap();

        let err = run.advance(RunState::Completed).unwrap_err();
        assert!(matches!(err, SyncError::InvalidStateTransition { .. }));
        assert_eq!(run.state(), RunState::Scanning);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut run = RunLifecycle::new(RunId::new());
        run.advance(RunState::Deciding).unwrap();
        run.advance(RunState::Failed).unwrap();

        assert!(run.advance(RunState::Deciding).is_err());
        assert!(run.advance(RunState::Completed).is_err());
    }

    #[test]
    fn test_cannot_skip_deciding() {
        let mut run = RunLifecycle::new(RunId::new());
        assert!(run.advance(RunState::Scanning).is_err());
    }
}
