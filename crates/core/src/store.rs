//! Task store trait definition and the shared batch filter.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::StoreError;
use crate::task::{Task, TaskId, TimeWindow, Timestamp};

/// A record the store returned but could not be turned into a [`Task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRecord {
    pub id: String,
    pub reason: String,
}

/// One cycle's worth of schedulable tasks, in rank order.
#[derive(Debug, Clone, Default)]
pub struct TaskBatch {
    pub tasks: Vec<Task>,
    /// Records that failed field extraction. Each counts as one task error.
    pub rejected: Vec<RejectedRecord>,
}

impl TaskBatch {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            rejected: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.rejected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len() + self.rejected.len()
    }
}

/// External collaborator holding the task records.
///
/// Implementations must never let a per-task write failure escape as a
/// panic; it is returned as a [`StoreError`] and counted by the caller.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    /// Human-readable name for logs (e.g. "memory", "json-file").
    fn name(&self) -> &str;

    /// Return the active, auto-schedulable tasks sorted ascending by rank.
    async fn fetch_schedulable_tasks(&self) -> Result<TaskBatch, StoreError>;

    /// Persist a placement together with the time it was decided.
    async fn write_scheduled_window(
        &self,
        task_id: &TaskId,
        window: TimeWindow,
        scheduled_at: Timestamp,
    ) -> Result<(), StoreError>;
}

/// Selection rules every store applies when building a [`TaskBatch`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Keep only tasks assigned to this person (case-insensitive).
    pub assignee: Option<String>,
}

impl TaskFilter {
    pub fn new(assignee: Option<String>) -> Self {
        Self { assignee }
    }

    /// Whether a single task belongs in the batch.
    pub fn admits(&self, task: &Task) -> bool {
        if task.status.is_inactive() || !task.auto_schedule_enabled() {
            return false;
        }
        match &self.assignee {
            Some(wanted) => task
                .assignees
                .iter()
                .any(|a| a.eq_ignore_ascii_case(wanted)),
            None => true,
        }
    }

    /// Filter and rank-sort the full contents of a store.
    ///
    /// Blockers that the store knows to be completed are dropped from
    /// `blocked_by`; any other blocker absent from the result keeps
    /// blocking. The sort is stable so store order breaks rank ties, and
    /// tasks without a rank go last.
    pub fn apply(&self, all: Vec<Task>) -> Vec<Task> {
        let completed: HashSet<TaskId> = all
            .iter()
            .filter(|t| t.status.is_completed())
            .map(|t| t.id.clone())
            .collect();

        let mut tasks: Vec<Task> = all
            .into_iter()
            .filter(|t| self.admits(t))
            .map(|mut t| {
                t.blocked_by.retain(|b| !completed.contains(b));
                t
            })
            .collect();

        tasks.sort_by(|a, b| compare_rank(a.rank, b.rank));
        tasks
    }
}

fn compare_rank(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
