//! Per-cycle record of which slot belongs to which task.

use std::collections::BTreeMap;

use chrono::Duration;
use taskslot_core::{TaskId, TimeWindow, Timestamp};

use super::slot::Slot;

/// Ordered map from occupied slot to the task holding it.
///
/// Entries are never longer than the longest slot inserted so far, which
/// bounds the range scan in [`overlaps`](OccupancyMap::overlaps) to the
/// entries starting in `(start - longest, end)`.
#[derive(Debug, Clone, Default)]
pub struct OccupancyMap {
    entries: BTreeMap<Slot, TaskId>,
    longest: Option<Duration>,
}

impl OccupancyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: Slot, task_id: TaskId) {
        let span = slot.end.signed_duration_since(slot.start);
        self.longest = Some(self.longest.map_or(span, |l| l.max(span)));
        self.entries.insert(slot, task_id);
    }

    /// Whether any occupied entry intersects `[start, end)`.
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.holders(start, end).next().is_some()
    }

    /// Occupied entries intersecting `[start, end)`, in start order.
    pub fn holders(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> impl Iterator<Item = (&Slot, &TaskId)> + '_ {
        let lower = self.longest.map(|span| start - span);
        let range = match lower {
            Some(lower) => self.entries.range(Slot::new(lower, lower)..),
            // Empty map: an unbounded range over nothing.
            None => self.entries.range::<Slot, _>(..),
        };
        range
            .take_while(move |(slot, _)| slot.start < end)
            .filter(move |(slot, _)| slot.overlaps(start, end))
    }

    /// Task holding the exact slot, if any.
    pub fn holder(&self, slot: &Slot) -> Option<&TaskId> {
        self.entries.get(slot)
    }

    /// Time covered by `task_id`, merged into contiguous windows.
    pub fn windows_of(&self, task_id: &TaskId) -> Vec<TimeWindow> {
        let mut windows: Vec<TimeWindow> = Vec::new();
        for slot in self.entries.iter().filter(|(_, t)| *t == task_id).map(|(s, _)| s) {
            match windows.last_mut() {
                Some(last) if last.end == slot.start => last.end = slot.end,
                _ => windows.push(slot.window()),
            }
        }
        windows
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Slot, &TaskId)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.longest = None;
    }
}
