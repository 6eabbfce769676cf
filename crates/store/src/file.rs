//! JSON snapshot task store.
//!
//! The file holds an array of [`PageRecord`]s. Fetches re-read the file
//! every cycle so external edits are picked up; writes patch the two
//! placement properties of one record and replace the file atomically.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use taskslot_core::{
    Config, RejectedRecord, StoreError, Task, TaskBatch, TaskFilter, TaskId, TaskStore, TimeWindow,
    Timestamp,
};

use crate::mapping::TaskMapper;
use crate::property::PageRecord;

pub struct JsonFileTaskStore {
    path: PathBuf,
    mapper: TaskMapper,
    filter: TaskFilter,
    /// Serializes read-modify-write cycles on the file.
    write_lock: Mutex<()>,
}

impl JsonFileTaskStore {
    pub fn new(path: impl Into<PathBuf>, mapper: TaskMapper, filter: TaskFilter) -> Self {
        Self {
            path: path.into(),
            mapper,
            filter,
            write_lock: Mutex::new(()),
        }
    }

    /// Store using the field mapping, timezone and assignee of `config`.
    pub fn from_config(path: impl Into<PathBuf>, config: &Config) -> Self {
        let mapper = TaskMapper::new(config.fields.clone(), config.scheduler.offset());
        let filter = TaskFilter::new(config.scheduler.assignee.clone());
        Self::new(path, mapper, filter)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in the file.
    pub async fn load_records(&self) -> Result<Vec<PageRecord>, StoreError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let records: Vec<PageRecord> = serde_json::from_str(&raw)?;
        debug!(path = %self.path.display(), records = records.len(), "loaded task snapshot");
        Ok(records)
    }

    async fn save_records(&self, records: &[PageRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tasks.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait::async_trait]
impl TaskStore for JsonFileTaskStore {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch_schedulable_tasks(&self) -> Result<TaskBatch, StoreError> {
        let records = self
            .load_records()
            .await
            .map_err(|e| StoreError::Fetch(format!("{}: {}", self.path.display(), e)))?;

        let mut tasks = Vec::with_capacity(records.len());
        let mut rejected = Vec::new();
        for record in &records {
            // Inactive records never enter the batch, so only their status
            // is read. They still reach the filter to release dependents.
            let mapped = match self.mapper.status(record) {
                Ok(status) if status.is_inactive() => {
                    Ok(Task::new(record.id.as_str(), String::new()).with_status(status))
                }
                Ok(_) => self.mapper.to_task(record),
                Err(e) => Err(e),
            };
            match mapped {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!(task_id = %record.id, error = %e, "skipping unreadable task record");
                    rejected.push(RejectedRecord {
                        id: record.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let total = tasks.len();
        let tasks = self.filter.apply(tasks);
        info!(
            "Found {} schedulable tasks ({} records, {} unreadable)",
            tasks.len(),
            total + rejected.len(),
            rejected.len()
        );
        Ok(TaskBatch { tasks, rejected })
    }

    async fn write_scheduled_window(
        &self,
        task_id: &TaskId,
        window: TimeWindow,
        scheduled_at: Timestamp,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load_records().await?;
        let record = records
            .iter_mut()
            .find(|r| r.id == task_id.as_str())
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;

        for (key, value) in self.mapper.placement_properties(window, scheduled_at) {
            record.properties.insert(key, value);
        }

        self.save_records(&records).await?;
        debug!(task_id = %task_id, window = %window, "placement written");
        Ok(())
    }
}
