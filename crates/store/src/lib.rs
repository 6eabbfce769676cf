//! Task store backed by store-native page records.
//!
//! External task databases describe a task as a page of typed properties
//! whose names differ per workspace. [`TaskMapper`] turns such a
//! [`PageRecord`] into a [`Task`](taskslot_core::Task) through the
//! configured [`FieldMapping`](taskslot_core::FieldMapping), and
//! [`JsonFileTaskStore`] serves a JSON snapshot of pages as a
//! [`TaskStore`](taskslot_core::TaskStore).

pub mod error;
pub mod file;
pub mod mapping;
pub mod property;

pub use error::MappingError;
pub use file::JsonFileTaskStore;
pub use mapping::TaskMapper;
pub use property::{DateValue, PageRecord, PropertyValue};
