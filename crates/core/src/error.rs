use thiserror::Error;

/// Invalid or unreadable scheduler configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid work hours: start {start}:00 must be before end {end}:00 (end at most 24)")]
    WorkHours { start: u32, end: u32 },

    #[error("invalid slot duration {minutes}min: must be between 1 and {max} minutes")]
    SlotDuration { minutes: u32, max: u32 },

    #[error("lookahead must cover at least one day")]
    Lookahead,

    #[error("at least one working day must be configured")]
    NoWorkingDays,

    #[error("invalid weekday: {0}")]
    Weekday(String),

    #[error("invalid timezone offset: {0}")]
    Timezone(String),

    #[error("scheduling interval must be at least one minute")]
    Interval,

    #[error("invalid reschedule policy: {0}")]
    Policy(String),
}

/// Failure talking to the external task store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("task not found: {0}")]
    NotFound(String),
}
