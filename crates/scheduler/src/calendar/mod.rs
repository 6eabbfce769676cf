//! Work calendar: slot generation, occupancy tracking and contiguous-range search.
//!
//! Split into focused submodules:
//! - `slot`: the atomic [`Slot`] type
//! - `occupancy`: the per-cycle [`OccupancyMap`]

mod occupancy;
mod slot;

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Weekday};
use tracing::{debug, info};

use taskslot_core::{SchedulerConfig, TaskId, TimeWindow, Timestamp};

pub use self::occupancy::OccupancyMap;
pub use self::slot::Slot;

/// Generates working-hour slots and tracks which of them are taken.
#[derive(Debug, Clone)]
pub struct SlotCalendar {
    work_start_hour: u32,
    work_end_hour: u32,
    slot_minutes: u32,
    lookahead_days: u32,
    working_days: Vec<Weekday>,
    offset: FixedOffset,
    occupied: OccupancyMap,
}

impl SlotCalendar {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            work_start_hour: config.work_start_hour,
            work_end_hour: config.work_end_hour,
            slot_minutes: config.slot_duration_minutes,
            lookahead_days: config.lookahead_days,
            working_days: config.working_days.clone(),
            offset: config.offset(),
            occupied: OccupancyMap::new(),
        }
    }

    pub fn lookahead_days(&self) -> u32 {
        self.lookahead_days
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_minutes))
    }

    pub fn occupancy(&self) -> &OccupancyMap {
        &self.occupied
    }

    /// Generate every working slot for the calendar days in
    /// `[window_start, window_start + lookahead_days)`, ordered by start.
    ///
    /// Slots starting before `now` are dropped.
    pub fn generate_work_slots(
        &self,
        window_start: Timestamp,
        lookahead_days: u32,
        now: Timestamp,
    ) -> Vec<Slot> {
        let first_day = window_start.with_timezone(&self.offset).date_naive();

        let mut slots = Vec::new();
        for day in first_day.iter_days().take(lookahead_days as usize) {
            if self.working_days.contains(&day.weekday()) {
                slots.extend(self.day_slots(day));
            }
        }

        slots.retain(|slot| slot.start >= now);
        slots
    }

    fn day_bounds(&self, day: NaiveDate) -> Option<(Timestamp, Timestamp)> {
        let midnight = day.and_hms_opt(0, 0, 0)?;
        let midnight = self.offset.from_local_datetime(&midnight).single()?;
        Some((
            midnight + Duration::hours(i64::from(self.work_start_hour)),
            midnight + Duration::hours(i64::from(self.work_end_hour)),
        ))
    }

    fn day_slots(&self, day: NaiveDate) -> Vec<Slot> {
        let Some((mut current, day_end)) = self.day_bounds(day) else {
            return Vec::new();
        };
        let step = self.slot_duration();

        let mut slots = Vec::new();
        while current + step <= day_end {
            slots.push(Slot::new(current, current + step));
            current += step;
        }
        slots
    }

    /// Whether `window` sits inside the working hours of one working day.
    pub fn contains_window(&self, window: &TimeWindow) -> bool {
        let start = window.start.with_timezone(&self.offset);
        let day = start.date_naive();
        if !self.working_days.contains(&day.weekday()) {
            return false;
        }
        match self.day_bounds(day) {
            Some((open, close)) => window.start >= open && window.end <= close && window.is_valid(),
            None => false,
        }
    }

    /// Record `[start, end)` as held by `task_id`, one entry per slot length.
    /// The final entry keeps its true, possibly shorter, end.
    pub fn mark_occupied(&mut self, start: Timestamp, end: Timestamp, task_id: &TaskId) {
        let step = self.slot_duration();
        let mut current = start.with_timezone(&self.offset);
        let end = end.with_timezone(&self.offset);
        while current < end {
            let next = current + step;
            self.occupied
                .insert(Slot::new(current, next.min(end)), task_id.clone());
            current = next;
        }
    }

    pub fn is_free(&self, window: &TimeWindow) -> bool {
        !self.occupied.overlaps(window.start, window.end)
    }

    /// Slots from `all_slots` that overlap no occupied entry.
    pub fn available(&self, all_slots: &[Slot]) -> Vec<Slot> {
        all_slots
            .iter()
            .filter(|slot| !self.occupied.overlaps(slot.start, slot.end))
            .copied()
            .collect()
    }

    /// Number of slots a task of `duration_hours` occupies (rounded up, at least one).
    pub fn slots_needed(&self, duration_hours: f64) -> usize {
        let exact = duration_hours * 60.0 / f64::from(self.slot_minutes);
        // Absorb float noise such as 0.1h * 60 = 6.000000000000001.
        let needed = (exact - 1e-9).ceil();
        if needed.is_finite() && needed >= 1.0 {
            needed as usize
        } else {
            1
        }
    }

    /// Find the earliest run of `slots_needed` adjacent same-day slots.
    ///
    /// `slots` must be sorted by start and already filtered to availability.
    /// With `prefer_before`, runs starting before that instant are tried
    /// first; the full set is searched when none fits, so a due date never
    /// prevents placement.
    pub fn find_contiguous_range(
        &self,
        slots: &[Slot],
        slots_needed: usize,
        prefer_before: Option<Timestamp>,
    ) -> Option<TimeWindow> {
        debug!(
            slots_needed,
            candidates = slots.len(),
            "searching for contiguous slots"
        );

        if let Some(deadline) = prefer_before {
            let cutoff = slots.partition_point(|slot| slot.start < deadline);
            if let Some(window) = first_run(&slots[..cutoff], slots_needed) {
                return Some(window);
            }
            info!(
                deadline = %deadline.format("%Y-%m-%d %H:%M"),
                "no free run before due date, scheduling after it"
            );
        }

        first_run(slots, slots_needed)
    }

    /// Drop every occupied entry. Called at the top of each cycle.
    pub fn clear(&mut self) {
        self.occupied.clear();
    }
}

/// First-fit scan for `needed` consecutive slots.
fn first_run(slots: &[Slot], needed: usize) -> Option<TimeWindow> {
    let needed = needed.max(1);
    let mut run_start = 0;
    for i in 0..slots.len() {
        if i > run_start && !slots[i - 1].is_followed_by(&slots[i]) {
            run_start = i;
        }
        if i + 1 - run_start >= needed {
            return Some(TimeWindow::new(slots[run_start].start, slots[i].end));
        }
    }
    None
}
