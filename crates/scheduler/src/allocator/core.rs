use taskslot_core::{SchedulerConfig, TaskId};

use crate::calendar::{OccupancyMap, SlotCalendar};

use super::decision::TaskOutcome;

/// Greedy, single-pass task allocator.
///
/// Owns the cycle-local calendar. Every cycle starts from an empty
/// occupancy map, so one allocator must never run two cycles at once.
pub struct Allocator {
    pub(super) config: SchedulerConfig,
    pub(super) calendar: SlotCalendar,
    /// Outcome of every successfully processed task in the last cycle, in
    /// processing order.
    pub(super) last_outcomes: Vec<(TaskId, TaskOutcome)>,
}

impl Allocator {
    pub fn new(config: SchedulerConfig) -> Self {
        let calendar = SlotCalendar::new(&config);
        Self {
            config,
            calendar,
            last_outcomes: Vec::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn calendar(&self) -> &SlotCalendar {
        &self.calendar
    }

    /// Occupancy left behind by the last cycle.
    pub fn occupancy(&self) -> &OccupancyMap {
        self.calendar.occupancy()
    }

    pub fn last_outcomes(&self) -> &[(TaskId, TaskOutcome)] {
        &self.last_outcomes
    }

    /// Outcome recorded for `task_id` in the last cycle.
    pub fn outcome_of(&self, task_id: &TaskId) -> Option<&TaskOutcome> {
        self.last_outcomes
            .iter()
            .find(|(id, _)| id == task_id)
            .map(|(_, outcome)| outcome)
    }
}
