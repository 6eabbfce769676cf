use tracing::{debug, error, info};

use taskslot_core::{StoreError, Task, TaskBatch, TaskStore, TimeWindow, Timestamp};

use crate::calendar::Slot;
use crate::error::AllocError;
use crate::stats::CycleStats;

use super::decision::{CycleContext, PlacementChange, SkipReason, TaskOutcome};
use super::Allocator;

impl Allocator {
    /// Fetch a batch from `store` and allocate it.
    ///
    /// Only a failed fetch is returned as an error; everything that goes
    /// wrong for an individual task is folded into the stats.
    pub async fn run_cycle(
        &mut self,
        store: &dyn TaskStore,
        now: Timestamp,
    ) -> Result<CycleStats, StoreError> {
        info!(store = store.name(), dry_run = self.config.dry_run, "Starting scheduling cycle");
        let batch = store.fetch_schedulable_tasks().await?;
        Ok(self.allocate(batch, store, now).await)
    }

    /// Place every task of `batch` in rank order, writing results to `store`.
    pub async fn allocate(
        &mut self,
        batch: TaskBatch,
        store: &dyn TaskStore,
        now: Timestamp,
    ) -> CycleStats {
        let mut stats = CycleStats::default();
        self.last_outcomes.clear();

        for rejected in &batch.rejected {
            let err = AllocError::Rejected {
                id: rejected.id.clone(),
                reason: rejected.reason.clone(),
            };
            error!(task_id = err.task_label(), error = %err, "Task record could not be read");
            stats.record_error();
        }

        self.calendar.clear();
        let slots = self
            .calendar
            .generate_work_slots(now, self.calendar.lookahead_days(), now);
        info!(
            "Generated {} work slots for {} tasks",
            slots.len(),
            batch.tasks.len()
        );

        let mut ctx = CycleContext::new(&batch.tasks, slots, now);

        for task in &batch.tasks {
            match self.process_task(task, &mut ctx, store).await {
                Ok(outcome) => {
                    log_outcome(task, &outcome);
                    stats.record(&outcome);
                    self.last_outcomes.push((task.id.clone(), outcome));
                }
                Err(e) => {
                    error!(task_id = %task.id, task = task.label(), error = %e, "Failed to schedule task");
                    stats.record_error();
                }
            }
        }

        info!(
            scheduled = stats.scheduled,
            rescheduled = stats.rescheduled,
            skipped = stats.skipped,
            errors = stats.errors,
            "Allocation finished"
        );
        stats
    }

    /// Run one task through the decision steps. Errors stay scoped to this task.
    async fn process_task(
        &mut self,
        task: &Task,
        ctx: &mut CycleContext,
        store: &dyn TaskStore,
    ) -> Result<TaskOutcome, AllocError> {
        if let Some(prior) = task.scheduled {
            if !prior.is_valid() {
                return Err(AllocError::InvalidWindow {
                    task_id: task.id.clone(),
                    start: prior.start,
                    end: prior.end,
                });
            }
        }

        let Some(hours) = task.schedulable_duration() else {
            return Ok(TaskOutcome::Skipped(SkipReason::NoDuration));
        };

        let min_start = match self.dependency_gate(task, ctx) {
            Ok(min_start) => min_start,
            Err(reason) => {
                self.hold_prior_seat(task);
                return Ok(TaskOutcome::Skipped(reason));
            }
        };

        let slots_needed = self.calendar.slots_needed(hours);

        if let Some(window) = self.keepable_window(task, slots_needed, min_start, ctx) {
            self.calendar.mark_occupied(window.start, window.end, &task.id);
            ctx.placements.insert(task.id.clone(), window);
            return Ok(TaskOutcome::Kept { window });
        }

        let candidates = self.candidates(&ctx.slots, min_start);
        let Some(window) = self
            .calendar
            .find_contiguous_range(&candidates, slots_needed, task.due)
        else {
            return Ok(TaskOutcome::Skipped(SkipReason::NoCapacity { slots_needed }));
        };

        let change = match task.scheduled {
            None => PlacementChange::New,
            Some(prior) if prior == window => PlacementChange::Unchanged,
            Some(_) => PlacementChange::Moved,
        };

        if change != PlacementChange::Unchanged {
            self.persist(task, window, ctx.now, store).await?;
        }

        self.calendar.mark_occupied(window.start, window.end, &task.id);
        ctx.placements.insert(task.id.clone(), window);
        Ok(TaskOutcome::Placed { window, change })
    }

    /// Free slots starting no earlier than `min_start`.
    fn candidates(&self, slots: &[Slot], min_start: Option<Timestamp>) -> Vec<Slot> {
        let free = self.calendar.available(slots);
        match min_start {
            Some(bound) => free.into_iter().filter(|slot| slot.start >= bound).collect(),
            None => free,
        }
    }

    async fn persist(
        &self,
        task: &Task,
        window: TimeWindow,
        now: Timestamp,
        store: &dyn TaskStore,
    ) -> Result<(), AllocError> {
        if self.config.dry_run {
            info!("[DRY RUN] Would schedule '{}' at {}", task.label(), window);
            return Ok(());
        }

        store
            .write_scheduled_window(&task.id, window, now)
            .await
            .map_err(|source| AllocError::Write {
                task_id: task.id.clone(),
                source,
            })
    }
}

fn log_outcome(task: &Task, outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Placed {
            window,
            change: PlacementChange::New,
        } => info!(task_id = %task.id, "Scheduled '{}' at {}", task.label(), window),
        TaskOutcome::Placed {
            window,
            change: PlacementChange::Moved,
        } => {
            let from = task
                .scheduled
                .map(|w| w.to_string())
                .unwrap_or_default();
            info!(task_id = %task.id, from = %from, "Rescheduled '{}' to {}", task.label(), window)
        }
        TaskOutcome::Placed {
            window,
            change: PlacementChange::Unchanged,
        } => debug!(task_id = %task.id, "'{}' stays at {}", task.label(), window),
        TaskOutcome::Kept { window } => {
            debug!(task_id = %task.id, "Keeping future placement of '{}' at {}", task.label(), window)
        }
        TaskOutcome::Skipped(SkipReason::NoCapacity { slots_needed }) => info!(
            task_id = %task.id,
            slots_needed,
            duration_hours = task.duration_hours.unwrap_or_default(),
            "Skipping '{}': no free slot run long enough",
            task.label()
        ),
        TaskOutcome::Skipped(reason) => {
            info!(task_id = %task.id, "Skipping '{}': {}", task.label(), reason)
        }
    }
}
