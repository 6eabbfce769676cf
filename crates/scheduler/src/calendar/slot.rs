//! Atomic unit of schedulable time.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use taskslot_core::{TimeWindow, Timestamp};

/// A fixed-length piece of working time. Identity is `(start, end)`;
/// ordering is by start, then end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Slot {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Slot {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Calendar day the slot starts on, in its own offset.
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start < end && self.end > start
    }

    /// Whether `next` continues this slot without a gap on the same day.
    pub fn is_followed_by(&self, next: &Slot) -> bool {
        self.end == next.start && self.date() == next.date()
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Slot({} - {})",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%H:%M")
        )
    }
}
