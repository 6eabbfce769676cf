use thiserror::Error;

use taskslot_core::{StoreError, TaskId, Timestamp};

/// Fault while processing a single task. Counted as one cycle error; the
/// cycle moves on to the next task.
#[derive(Error, Debug)]
pub enum AllocError {
    #[error("task {task_id}: scheduled window {start} - {end} ends before it starts")]
    InvalidWindow {
        task_id: TaskId,
        start: Timestamp,
        end: Timestamp,
    },

    #[error("task {task_id}: failed to write placement: {source}")]
    Write {
        task_id: TaskId,
        #[source]
        source: StoreError,
    },

    #[error("record {id} rejected: {reason}")]
    Rejected { id: String, reason: String },
}

impl AllocError {
    /// Identifier of the task or record the fault belongs to.
    pub fn task_label(&self) -> &str {
        match self {
            AllocError::InvalidWindow { task_id, .. } | AllocError::Write { task_id, .. } => {
                task_id.as_str()
            }
            AllocError::Rejected { id, .. } => id,
        }
    }
}
