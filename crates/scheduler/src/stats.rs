use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::allocator::{PlacementChange, TaskOutcome};

/// Counts returned by one scheduling cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    /// Tasks placed for the first time.
    pub scheduled: u32,
    /// Tasks moved away from their previous window.
    pub rescheduled: u32,
    pub skipped: u32,
    pub errors: u32,
}

impl CycleStats {
    /// Result of a cycle that could not fetch its batch.
    pub fn fetch_failed() -> Self {
        Self {
            errors: 1,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Placed {
                change: PlacementChange::New,
                ..
            } => self.scheduled += 1,
            TaskOutcome::Placed {
                change: PlacementChange::Moved,
                ..
            } => self.rescheduled += 1,
            TaskOutcome::Placed {
                change: PlacementChange::Unchanged,
                ..
            }
            | TaskOutcome::Kept { .. }
            | TaskOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// Tasks that received a new or moved window.
    pub fn placed(&self) -> u32 {
        self.scheduled + self.rescheduled
    }

    fn accumulate(&mut self, other: &CycleStats) {
        self.scheduled += other.scheduled;
        self.rescheduled += other.rescheduled;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scheduled, {} rescheduled, {} skipped, {} errors",
            self.scheduled, self.rescheduled, self.skipped, self.errors
        )
    }
}

/// Running totals across every cycle a session has executed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub cycles_run: u64,
    /// Cycles whose batch could not be fetched.
    pub cycles_failed: u64,
    pub cycles_timed_out: u64,
    /// Sum of every cycle's counts.
    pub totals: CycleStats,
    /// Average wall-clock duration of a cycle.
    pub avg_cycle_duration: Duration,
}

impl SessionMetrics {
    /// Record a finished cycle.
    pub fn record_cycle(&mut self, stats: &CycleStats, duration: Duration) {
        self.cycles_run += 1;
        self.totals.accumulate(stats);

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_cycle_duration = if self.cycles_run == 1 {
            duration
        } else {
            let prev_nanos = self.avg_cycle_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / self.cycles_run as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn record_fetch_failure(&mut self) {
        self.cycles_failed += 1;
    }

    pub fn record_timeout(&mut self) {
        self.cycles_timed_out += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SkipReason;
    use chrono::DateTime;
    use taskslot_core::{TaskId, TimeWindow};

    fn window() -> TimeWindow {
        TimeWindow::new(
            DateTime::parse_from_rfc3339("2026-10-19T09:00:00Z").unwrap(),
            DateTime::parse_from_rfc3339("2026-10-19T10:00:00Z").unwrap(),
        )
    }

    #[test]
    fn outcomes_map_to_counters() {
        let mut stats = CycleStats::default();
        let w = window();
        stats.record(&TaskOutcome::Placed { window: w, change: PlacementChange::New });
        stats.record(&TaskOutcome::Placed { window: w, change: PlacementChange::Moved });
        stats.record(&TaskOutcome::Placed { window: w, change: PlacementChange::Unchanged });
        stats.record(&TaskOutcome::Kept { window: w });
        stats.record(&TaskOutcome::Skipped(SkipReason::NoDuration));
        stats.record(&TaskOutcome::Skipped(SkipReason::BlockedPending {
            blocker: TaskId::from("b"),
        }));
        stats.record_error();

        assert_eq!(
            stats,
            CycleStats { scheduled: 1, rescheduled: 1, skipped: 4, errors: 1 }
        );
        assert_eq!(stats.placed(), 2);
        assert!(stats.has_errors());
    }

    #[test]
    fn fetch_failure_is_zero_progress() {
        let stats = CycleStats::fetch_failed();
        assert_eq!(stats.placed(), 0);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn session_metrics_average_durations() {
        let mut m = SessionMetrics::default();
        let stats = CycleStats { scheduled: 2, ..CycleStats::default() };
        m.record_cycle(&stats, Duration::from_millis(100));
        m.record_cycle(&stats, Duration::from_millis(200));

        assert_eq!(m.cycles_run, 2);
        assert_eq!(m.totals.scheduled, 4);
        let avg = m.avg_cycle_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }

    #[test]
    fn display_lists_every_counter() {
        let stats = CycleStats { scheduled: 3, rescheduled: 1, skipped: 2, errors: 0 };
        assert_eq!(stats.to_string(), "3 scheduled, 1 rescheduled, 2 skipped, 0 errors");
    }
}
