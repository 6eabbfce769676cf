//! Allocator -- places a rank-ordered task batch into the slot calendar.
//!
//! Split into focused submodules:
//! - `core`: Allocator struct, constructor and accessors
//! - `decision`: per-task outcomes, dependency gating and seat keeping
//! - `execution`: the cycle loop, placement search and write-back

mod core;
mod decision;
mod execution;

pub use self::core::Allocator;
pub use self::decision::{PlacementChange, SkipReason, TaskOutcome};
