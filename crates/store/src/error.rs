use thiserror::Error;

/// A page property that cannot be read as the task field it maps to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("record has no {0}")]
    Missing(&'static str),

    #[error("property '{property}' has type {found}, expected {expected}")]
    WrongType {
        property: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("property '{property}' has unparseable date '{value}'")]
    InvalidDate { property: String, value: String },
}
