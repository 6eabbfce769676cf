//! In-process task store, used by tests and dry runs against fixtures.

use std::collections::HashSet;
use std::sync::RwLock;

use taskslot_core::{StoreError, Task, TaskBatch, TaskFilter, TaskId, TaskStore, TimeWindow, Timestamp};

/// A write the store accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub task_id: TaskId,
    pub window: TimeWindow,
    pub scheduled_at: Timestamp,
}

#[derive(Debug, Default)]
struct MemoryState {
    tasks: Vec<Task>,
    writes: Vec<RecordedWrite>,
    failing_writes: HashSet<TaskId>,
    fail_fetch: bool,
}

/// [`TaskStore`] backed by a vector of tasks.
///
/// Accepted writes update the stored task, so a following cycle sees the
/// new placement as the task's previous window.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    state: RwLock<MemoryState>,
    filter: TaskFilter,
}

impl InMemoryTaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self::with_filter(tasks, TaskFilter::default())
    }

    pub fn with_filter(tasks: Vec<Task>, filter: TaskFilter) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                tasks,
                ..MemoryState::default()
            }),
            filter,
        }
    }

    /// Make every write for `task_id` fail.
    pub fn fail_writes_for(&self, task_id: impl Into<TaskId>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.failing_writes.insert(task_id.into());
    }

    pub fn set_fetch_failure(&self, fail: bool) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.fail_fetch = fail;
    }

    /// Every accepted write, oldest first.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.writes.clone()
    }

    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.tasks.iter().find(|t| &t.id == task_id).cloned()
    }

    /// Replace the stored tasks, keeping recorded writes.
    pub fn replace_tasks(&self, tasks: Vec<Task>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.tasks = tasks;
    }
}

#[async_trait::async_trait]
impl TaskStore for InMemoryTaskStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_schedulable_tasks(&self) -> Result<TaskBatch, StoreError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.fail_fetch {
            return Err(StoreError::Fetch("memory store set to fail".to_string()));
        }
        Ok(TaskBatch::new(self.filter.apply(state.tasks.clone())))
    }

    async fn write_scheduled_window(
        &self,
        task_id: &TaskId,
        window: TimeWindow,
        scheduled_at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.failing_writes.contains(task_id) {
            return Err(StoreError::Write(format!("write rejected for {task_id}")));
        }
        let task = state
            .tasks
            .iter_mut()
            .find(|t| &t.id == task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        task.scheduled = Some(window);
        state.writes.push(RecordedWrite {
            task_id: task_id.clone(),
            window,
            scheduled_at,
        });
        Ok(())
    }
}
