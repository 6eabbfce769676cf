//! Calendar slot generation and dependency-aware task allocation.
//!
//! Each cycle the [`Allocator`] clears the [`SlotCalendar`]'s occupancy,
//! generates the working slots for the lookahead window and walks the
//! rank-ordered batch once, placing every task into the earliest free
//! contiguous run that respects its blockers and (softly) its due date.
//! [`SchedulerSession`] wraps that in single-flight cycle handling for a
//! host loop.

pub mod allocator;
pub mod calendar;
pub mod deps;
pub mod error;
pub mod memory;
pub mod session;
pub mod stats;

pub use allocator::{Allocator, PlacementChange, SkipReason, TaskOutcome};
pub use calendar::{OccupancyMap, Slot, SlotCalendar};
pub use deps::{DependencyGraph, Resolution};
pub use error::AllocError;
pub use memory::InMemoryTaskStore;
pub use session::{CycleOutcome, CycleReport, SchedulerSession, SchedulerStatus};
pub use stats::{CycleStats, SessionMetrics};
