//! Typed accessors from page properties to [`Task`] fields.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};
use tracing::debug;

use taskslot_core::{FieldMapping, Task, TaskId, TaskStatus, TimeWindow, Timestamp};

use crate::error::MappingError;
use crate::property::{DateValue, PageRecord, PropertyValue, RichText};

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// How a bare `YYYY-MM-DD` date becomes an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BareDate {
    /// Midnight at the start of that day.
    StartOfDay,
    /// Midnight at the end of that day, i.e. "by the end of".
    EndOfDay,
}

/// Parse a store date string in `offset`.
///
/// Accepts RFC 3339 timestamps, timestamps without offset (read in
/// `offset`) and bare dates.
pub fn parse_timestamp(raw: &str, offset: FixedOffset, bare: BareDate) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return offset.from_local_datetime(&naive).single();
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let day = match bare {
        BareDate::StartOfDay => date,
        BareDate::EndOfDay => date.succ_opt()?,
    };
    offset.from_local_datetime(&day.and_hms_opt(0, 0, 0)?).single()
}

/// Translates [`PageRecord`]s into tasks using a [`FieldMapping`].
#[derive(Debug, Clone)]
pub struct TaskMapper {
    fields: FieldMapping,
    offset: FixedOffset,
}

impl TaskMapper {
    pub fn new(fields: FieldMapping, offset: FixedOffset) -> Self {
        Self { fields, offset }
    }

    pub fn fields(&self) -> &FieldMapping {
        &self.fields
    }

    /// Build a [`Task`]. Missing properties leave the field empty; a property
    /// of the wrong kind fails the whole record.
    pub fn to_task(&self, record: &PageRecord) -> Result<Task, MappingError> {
        if record.id.trim().is_empty() {
            return Err(MappingError::Missing("id"));
        }
        let f = &self.fields;

        let mut task = Task::new(record.id.as_str(), self.text(record, &f.name)?.unwrap_or_default());
        task.rank = self.number(record, &f.rank)?;
        task.duration_hours = self.number(record, &f.duration)?;
        task.due = self.due(record)?;
        task.scheduled = self.scheduled(record)?;
        task.status = self.status(record)?;
        task.blocked_by = self.relation(record, &f.blocked_by)?;
        task.auto_schedule = self.checkbox(record, &f.auto_schedule)?;
        task.assignees = self.people(record, &f.assignee)?;
        Ok(task)
    }

    /// Read only the status property. A record without one is not started.
    pub fn status(&self, record: &PageRecord) -> Result<TaskStatus, MappingError> {
        Ok(self
            .choice(record, &self.fields.status)?
            .map(|name| TaskStatus::parse(&name))
            .unwrap_or_default())
    }

    /// Properties to write back for a placement decided at `scheduled_at`.
    pub fn placement_properties(
        &self,
        window: TimeWindow,
        scheduled_at: Timestamp,
    ) -> [(String, PropertyValue); 2] {
        [
            (
                self.fields.scheduled.clone(),
                PropertyValue::date(window.start.to_rfc3339(), Some(window.end.to_rfc3339())),
            ),
            (
                self.fields.last_scheduled.clone(),
                PropertyValue::date(scheduled_at.to_rfc3339(), None),
            ),
        ]
    }

    fn text(&self, record: &PageRecord, key: &str) -> Result<Option<String>, MappingError> {
        match record.property(key) {
            None => Ok(None),
            Some(PropertyValue::Title { title: parts })
            | Some(PropertyValue::RichText { rich_text: parts }) => Ok(Some(join_text(parts))),
            Some(other) => Err(wrong_type(key, "title or rich_text", other)),
        }
    }

    fn number(&self, record: &PageRecord, key: &str) -> Result<Option<f64>, MappingError> {
        match record.property(key) {
            None => Ok(None),
            Some(PropertyValue::Number { number }) => Ok(*number),
            Some(other) => Err(wrong_type(key, "number", other)),
        }
    }

    fn choice(&self, record: &PageRecord, key: &str) -> Result<Option<String>, MappingError> {
        match record.property(key) {
            None => Ok(None),
            Some(PropertyValue::Select { select: option })
            | Some(PropertyValue::Status { status: option }) => {
                Ok(option.as_ref().map(|o| o.name.clone()))
            }
            Some(other) => Err(wrong_type(key, "select or status", other)),
        }
    }

    fn date_value<'a>(
        &self,
        record: &'a PageRecord,
        key: &str,
    ) -> Result<Option<&'a DateValue>, MappingError> {
        match record.property(key) {
            None => Ok(None),
            Some(PropertyValue::Date { date }) => Ok(date.as_ref()),
            Some(other) => Err(wrong_type(key, "date", other)),
        }
    }

    fn parse(&self, key: &str, raw: &str, bare: BareDate) -> Result<Timestamp, MappingError> {
        parse_timestamp(raw, self.offset, bare).ok_or_else(|| MappingError::InvalidDate {
            property: key.to_string(),
            value: raw.to_string(),
        })
    }

    /// Due date. Ranges collapse to their start.
    fn due(&self, record: &PageRecord) -> Result<Option<Timestamp>, MappingError> {
        let key = &self.fields.due;
        match self.date_value(record, key)? {
            Some(date) => self.parse(key, &date.start, BareDate::EndOfDay).map(Some),
            None => Ok(None),
        }
    }

    /// Previous placement. A date without an end is no usable window.
    fn scheduled(&self, record: &PageRecord) -> Result<Option<TimeWindow>, MappingError> {
        let key = &self.fields.scheduled;
        let Some(date) = self.date_value(record, key)? else {
            return Ok(None);
        };
        let start = self.parse(key, &date.start, BareDate::StartOfDay)?;
        match &date.end {
            Some(end) => {
                let end = self.parse(key, end, BareDate::StartOfDay)?;
                Ok(Some(TimeWindow::new(start, end)))
            }
            None => {
                debug!(task_id = %record.id, "scheduled date has no end, treating task as unplaced");
                Ok(None)
            }
        }
    }

    fn checkbox(&self, record: &PageRecord, key: &str) -> Result<Option<bool>, MappingError> {
        match record.property(key) {
            None => Ok(None),
            Some(PropertyValue::Checkbox { checkbox }) => Ok(Some(*checkbox)),
            Some(other) => Err(wrong_type(key, "checkbox", other)),
        }
    }

    fn relation(&self, record: &PageRecord, key: &str) -> Result<Vec<TaskId>, MappingError> {
        match record.property(key) {
            None => Ok(Vec::new()),
            Some(PropertyValue::Relation { relation }) => {
                Ok(relation.iter().map(|r| TaskId::from(r.id.as_str())).collect())
            }
            Some(other) => Err(wrong_type(key, "relation", other)),
        }
    }

    fn people(&self, record: &PageRecord, key: &str) -> Result<Vec<String>, MappingError> {
        match record.property(key) {
            None => Ok(Vec::new()),
            Some(PropertyValue::People { people }) => Ok(people
                .iter()
                .map(|p| p.name.clone().unwrap_or_else(|| p.id.clone()))
                .collect()),
            Some(other) => Err(wrong_type(key, "people", other)),
        }
    }
}

fn join_text(parts: &[RichText]) -> String {
    parts.iter().map(|p| p.plain_text.as_str()).collect()
}

fn wrong_type(key: &str, expected: &'static str, found: &PropertyValue) -> MappingError {
    MappingError::WrongType {
        property: key.to_string(),
        expected,
        found: found.kind(),
    }
}
