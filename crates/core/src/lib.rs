pub mod config;
pub mod error;
pub mod store;
pub mod task;

pub use config::{Config, FieldMapping, ReschedulePolicy, SchedulerConfig, TimeZoneSpec};
pub use error::*;
pub use store::{RejectedRecord, TaskBatch, TaskFilter, TaskStore};
pub use task::*;
