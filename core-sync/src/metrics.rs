//! Per-phase timing and volume for one run.

use crate::state::{PhaseOutcome, PhaseReport};
use bridge_traits::catalog::{Phase, SourceId};
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_async::time::Instant;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct ActivePhase {
    phase: Phase,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Records when each phase starts and ends.
///
/// Wall-clock timestamps come from the injected [`Clock`]; durations use a
/// monotonic [`Instant`] so clock adjustments cannot produce negative spans.
pub struct PhaseMetricsRecorder {
    source_id: SourceId,
    clock: Arc<dyn Clock>,
    active: Option<ActivePhase>,
    reports: Vec<PhaseReport>,
    phases_started: u32,
}

impl PhaseMetricsRecorder {
    pub fn new(source_id: SourceId, clock: Arc<dyn Clock>) -> Self {
        Self {
            source_id,
            clock,
            active: None,
            reports: Vec::new(),
            phases_started: 0,
        }
    }

    /// Starts timing `phase`.
    ///
    /// Returns `false` without touching anything if `phase` is already
    /// active. A different active phase is closed first with zero items.
    pub fn start_phase(&mut self, phase: Phase) -> bool {
        if let Some(active) = &self.active {
            if active.phase == phase {
                return false;
            }
            warn!(
                source_id = %self.source_id,
                phase = %active.phase,
                "Phase replaced without being finished"
            );
            self.close(0, PhaseOutcome::Completed);
        }

        debug!(source_id = %self.source_id, phase = %phase, "Phase started");
        self.active = Some(ActivePhase {
            phase,
            started_at: self.clock.now(),
            started: Instant::now(),
        });
        self.phases_started += 1;
        true
    }

    /// Completes the active phase with `items` discovered in it.
    pub fn finish_active(&mut self, items: u64) -> Option<&PhaseReport> {
        self.close(items, PhaseOutcome::Completed)
    }

    /// Aborts the active phase after a failure or cancellation.
    pub fn abort_active(&mut self, items: u64) -> Option<&PhaseReport> {
        self.close(items, PhaseOutcome::Aborted)
    }

    fn close(&mut self, items: u64, outcome: PhaseOutcome) -> Option<&PhaseReport> {
        let active = self.active.take()?;
        let duration_ms = active.started.elapsed().as_millis() as u64;

        let report = PhaseReport {
            phase: active.phase,
            started_at: active.started_at,
            finished_at: self.clock.now(),
            duration_ms,
            items,
            outcome,
        };

        match outcome {
            PhaseOutcome::Completed => info!(
                source_id = %self.source_id,
                phase = %report.phase,
                items,
                duration_ms,
                "Phase completed"
            ),
            PhaseOutcome::Aborted => warn!(
                source_id = %self.source_id,
                phase = %report.phase,
                items,
                duration_ms,
                "Phase aborted"
            ),
        }

        self.reports.push(report);
        self.reports.last()
    }

    pub fn active_phase(&self) -> Option<Phase> {
        self.active.as_ref().map(|active| active.phase)
    }

    /// How many times a phase was started in this run.
    pub fn phases_started(&self) -> u32 {
        self.phases_started
    }

    pub fn reports(&self) -> &[PhaseReport] {
        &self.reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::ManualClock;
    use chrono::TimeZone;
    use std::time::Duration;

    fn recorder() -> (PhaseMetricsRecorder, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let recorder = PhaseMetricsRecorder::new(SourceId::from("src"), clock.clone());
        (recorder, clock)
    }

    #[test]
    fn test_start_phase_is_idempotent() {
        let (mut metrics, _) = recorder();

        assert!(metrics.start_phase(Phase::Live));
        assert!(!metrics.start_phase(Phase::Live));
        assert!(!metrics.start_phase(Phase::Live));

        assert_eq!(metrics.phases_started(), 1);
        assert_eq!(metrics.active_phase(), Some(Phase::Live));
    }

    #[test]
    fn test_finish_records_wall_clock_span() {
        let (mut metrics, clock) = recorder();

        metrics.start_phase(Phase::Movies);
        clock.advance(Duration::from_secs(3));
        let report = metrics.finish_active(42).cloned().unwrap();

        assert_eq!(report.phase, Phase::Movies);
        assert_eq!(report.items, 42);
        assert_eq!(report.outcome, PhaseOutcome::Completed);
        assert_eq!(
            (report.finished_at - report.started_at).num_seconds(),
            3
        );
        assert_eq!(metrics.active_phase(), None);
    }

    #[test]
    fn test_abort_marks_outcome() {
        let (mut metrics, _) = recorder();

        metrics.start_phase(Phase::Series);
        metrics.abort_active(7);

        assert_eq!(metrics.reports().len(), 1);
        assert_eq!(metrics.reports()[0].outcome, PhaseOutcome::Aborted);
    }

    #[test]
    fn test_finish_without_active_phase() {
        let (mut metrics, _) = recorder();
        assert!(metrics.finish_active(0).is_none());
        assert!(metrics.reports().is_empty());
    }

    #[test]
    fn test_starting_other_phase_closes_previous() {
        let (mut metrics, _) = recorder();

        metrics.start_phase(Phase::Live);
        metrics.start_phase(Phase::Movies);

        assert_eq!(metrics.phases_started(), 2);
        assert_eq!(metrics.reports().len(), 1);
        assert_eq!(metrics.reports()[0].phase, Phase::Live);
    }
}
