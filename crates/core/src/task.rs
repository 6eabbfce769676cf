use std::fmt;

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};

/// Timezone-aware instant used throughout the scheduler.
pub type Timestamp = DateTime<FixedOffset>;

/// Identifier of a task in the external task store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A half-open `[start, end)` range of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end.signed_duration_since(self.start)
    }

    /// Whether the window has a positive length.
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Whether the window lies within one calendar day in the start's offset.
    /// An end at the following midnight still belongs to the start's day.
    pub fn is_single_day(&self) -> bool {
        let last = if self.end > self.start {
            self.end - Duration::nanoseconds(1)
        } else {
            self.end
        };
        self.start.date_naive() == last.with_timezone(self.start.offset()).date_naive()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Workflow status as reported by the task store.
///
/// Stores use free-form status names; the well-known ones are recognised
/// case-insensitively and everything else is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Canceled,
    Backlog,
    Other(String),
}

impl TaskStatus {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "not started" | "todo" | "to do" => TaskStatus::NotStarted,
            "in progress" | "doing" => TaskStatus::InProgress,
            "completed" | "done" => TaskStatus::Completed,
            "canceled" | "cancelled" => TaskStatus::Canceled,
            "backlog" => TaskStatus::Backlog,
            _ => TaskStatus::Other(name.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::NotStarted => "Not started",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Completed => "Completed",
            TaskStatus::Canceled => "Canceled",
            TaskStatus::Backlog => "Backlog",
            TaskStatus::Other(name) => name,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    /// Terminal or not-yet-active statuses never enter a scheduling batch.
    pub fn is_inactive(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Canceled | TaskStatus::Backlog
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        TaskStatus::parse(&s)
    }
}

impl From<TaskStatus> for String {
    fn from(s: TaskStatus) -> Self {
        s.as_str().to_string()
    }
}

/// A schedulable work item. Owned by the external store; the scheduler
/// only ever writes back `scheduled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Ordering key, ascending = higher priority.
    pub rank: Option<f64>,
    /// Estimated duration in hours.
    pub duration_hours: Option<f64>,
    /// Soft deadline. Range-valued due dates are collapsed to their start.
    pub due: Option<Timestamp>,
    /// Previous placement, if any.
    pub scheduled: Option<TimeWindow>,
    pub status: TaskStatus,
    /// Tasks that must finish before this one may start.
    pub blocked_by: Vec<TaskId>,
    /// `None` means the store has no flag for this task, which counts as enabled.
    pub auto_schedule: Option<bool>,
    pub assignees: Vec<String>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rank: None,
            duration_hours: None,
            due: None,
            scheduled: None,
            status: TaskStatus::default(),
            blocked_by: Vec::new(),
            auto_schedule: None,
            assignees: Vec::new(),
        }
    }

    pub fn with_rank(mut self, rank: f64) -> Self {
        self.rank = Some(rank);
        self
    }

    pub fn with_duration(mut self, hours: f64) -> Self {
        self.duration_hours = Some(hours);
        self
    }

    pub fn with_due(mut self, due: Timestamp) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_scheduled(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.scheduled = Some(TimeWindow::new(start, end));
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_blockers<I, T>(mut self, blockers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.blocked_by = blockers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auto_schedule(mut self, enabled: bool) -> Self {
        self.auto_schedule = Some(enabled);
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignees.push(assignee.into());
        self
    }

    pub fn auto_schedule_enabled(&self) -> bool {
        self.auto_schedule.unwrap_or(true)
    }

    /// Duration usable for placement: present, finite and positive.
    pub fn schedulable_duration(&self) -> Option<f64> {
        self.duration_hours.filter(|h| h.is_finite() && *h > 0.0)
    }

    /// Display label for logs.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}
