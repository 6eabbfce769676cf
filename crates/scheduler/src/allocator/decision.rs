use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use taskslot_core::{ReschedulePolicy, Task, TaskId, TimeWindow, Timestamp};

use crate::calendar::Slot;
use crate::deps::DependencyGraph;

use super::Allocator;

/// How a placement relates to the task's previous window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementChange {
    /// The task had no window before.
    New,
    /// The task moved away from its previous window.
    Moved,
    /// The search landed exactly on the previous window. Nothing is written.
    Unchanged,
}

/// Why a task was not placed this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoDuration,
    /// A blocker is not part of this cycle's batch.
    BlockedPermanently { blocker: TaskId },
    /// A blocker is in the batch but has not been placed yet. Retried next cycle.
    BlockedPending { blocker: TaskId },
    NoCapacity { slots_needed: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoDuration => f.write_str("no duration"),
            SkipReason::BlockedPermanently { blocker } => {
                write!(f, "blocked by {blocker}, which is not schedulable")
            }
            SkipReason::BlockedPending { blocker } => {
                write!(f, "blocked by {blocker}, not placed yet")
            }
            SkipReason::NoCapacity { slots_needed } => {
                write!(f, "no free run of {slots_needed} slots")
            }
        }
    }
}

/// Terminal state of one task in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Placed {
        window: TimeWindow,
        change: PlacementChange,
    },
    /// The previous future window was kept as is.
    Kept { window: TimeWindow },
    Skipped(SkipReason),
}

impl TaskOutcome {
    /// Window the task holds after this cycle, if it was placed or kept.
    pub fn window(&self) -> Option<TimeWindow> {
        match self {
            TaskOutcome::Placed { window, .. } | TaskOutcome::Kept { window } => Some(*window),
            TaskOutcome::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            TaskOutcome::Skipped(reason) => Some(reason),
            _ => None,
        }
    }
}

/// State shared by every task decision within one cycle.
pub(super) struct CycleContext {
    pub now: Timestamp,
    /// Every generated slot, free or not, in start order.
    pub slots: Vec<Slot>,
    pub graph: DependencyGraph,
    /// Windows placed or kept so far this cycle.
    pub placements: HashMap<TaskId, TimeWindow>,
}

impl CycleContext {
    pub fn new(tasks: &[Task], slots: Vec<Slot>, now: Timestamp) -> Self {
        Self {
            now,
            slots,
            graph: DependencyGraph::from_tasks(tasks),
            placements: HashMap::new(),
        }
    }

    /// End of the generated calendar.
    pub fn horizon(&self) -> Option<Timestamp> {
        self.slots.last().map(|slot| slot.end)
    }
}

impl Allocator {
    /// Check every transitive blocker of `task`.
    ///
    /// Returns the earliest start allowed by the blockers placed this
    /// cycle, or the reason the task has to wait.
    pub(super) fn dependency_gate(
        &self,
        task: &Task,
        ctx: &CycleContext,
    ) -> Result<Option<Timestamp>, SkipReason> {
        if task.blocked_by.is_empty() {
            return Ok(None);
        }

        let resolution = ctx.graph.resolve(&task.id);

        if let Some(blocker) = resolution.ancestors.iter().find(|id| !ctx.graph.contains(id)) {
            return Err(SkipReason::BlockedPermanently {
                blocker: blocker.clone(),
            });
        }

        let mut min_start: Option<Timestamp> = None;
        for ancestor in &resolution.ancestors {
            match ctx.placements.get(ancestor) {
                Some(window) => {
                    min_start = Some(min_start.map_or(window.end, |m| m.max(window.end)));
                }
                None => {
                    return Err(SkipReason::BlockedPending {
                        blocker: ancestor.clone(),
                    })
                }
            }
        }
        Ok(min_start)
    }

    /// Re-mark a blocked task's previous window so lower-ranked tasks
    /// cannot be placed on top of it.
    pub(super) fn hold_prior_seat(&mut self, task: &Task) {
        let Some(prior) = task.scheduled else {
            return;
        };
        if self.calendar.is_free(&prior) {
            debug!(task_id = %task.id, window = %prior, "keeping previous seat for blocked task");
            self.calendar.mark_occupied(prior.start, prior.end, &task.id);
        } else {
            warn!(
                task_id = %task.id,
                window = %prior,
                "previous seat of blocked task is already taken, not holding it"
            );
        }
    }

    /// Previous window worth keeping under [`ReschedulePolicy::KeepFuture`].
    ///
    /// It must still lie ahead, inside the generated calendar and working
    /// hours, match the task's current length, be free, and respect the
    /// dependency bound.
    pub(super) fn keepable_window(
        &self,
        task: &Task,
        slots_needed: usize,
        min_start: Option<Timestamp>,
        ctx: &CycleContext,
    ) -> Option<TimeWindow> {
        if self.config.reschedule_policy != ReschedulePolicy::KeepFuture {
            return None;
        }
        let prior = task.scheduled?;
        let horizon = ctx.horizon()?;
        let expected_len = self.calendar.slot_duration() * i32::try_from(slots_needed).ok()?;

        let keep = prior.start >= ctx.now
            && prior.end <= horizon
            && prior.duration() == expected_len
            && min_start.map_or(true, |m| prior.start >= m)
            && self.calendar.contains_window(&prior)
            && self.calendar.is_free(&prior);
        keep.then_some(prior)
    }
}
