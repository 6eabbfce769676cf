use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{Duration, FixedOffset, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: FromStr>(profile: &str, key: &str, default: T) -> T {
    match profiled_env_opt(profile, key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "unparseable config value, using default");
            default
        }),
        None => default,
    }
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fields: FieldMapping,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TASKSLOT_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TASKSLOT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            scheduler: SchedulerConfig::from_env_profiled(p),
            fields: FieldMapping::from_env_profiled(p),
        }
    }

    /// Parse a TOML document. Missing sections and keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load_toml(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        let s = &self.scheduler;
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  work hours:  {}", s.work_hours_label());
        tracing::info!("  work days:   {}", s.working_days_label());
        tracing::info!("  slot:        {} minutes", s.slot_duration_minutes);
        tracing::info!("  lookahead:   {} days", s.lookahead_days);
        tracing::info!("  timezone:    {}", s.timezone);
        tracing::info!("  interval:    {} minutes", s.interval_minutes);
        tracing::info!("  policy:      {}", s.reschedule_policy);
        tracing::info!("  assignee:    {}", s.assignee.as_deref().unwrap_or("(any)"));
        if s.dry_run {
            tracing::info!("  dry run:     no changes will be written");
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

/// Whether tasks that already hold a future placement are re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReschedulePolicy {
    /// Recompute every eligible task every cycle.
    #[default]
    Always,
    /// Keep a still-valid future placement where it is.
    KeepFuture,
}

impl FromStr for ReschedulePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "always" => Ok(ReschedulePolicy::Always),
            "keep_future" => Ok(ReschedulePolicy::KeepFuture),
            _ => Err(ConfigError::Policy(s.to_string())),
        }
    }
}

impl fmt::Display for ReschedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReschedulePolicy::Always => f.write_str("always"),
            ReschedulePolicy::KeepFuture => f.write_str("keep_future"),
        }
    }
}

/// Fixed UTC offset the work calendar is laid out in (`UTC`, `Z`, `+02:00`, `-0530`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeZoneSpec(FixedOffset);

impl TimeZoneSpec {
    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    pub fn offset(&self) -> FixedOffset {
        self.0
    }
}

impl Default for TimeZoneSpec {
    fn default() -> Self {
        Self::utc()
    }
}

impl FromStr for TimeZoneSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if raw.eq_ignore_ascii_case("utc") || raw.eq_ignore_ascii_case("z") {
            return Ok(Self::utc());
        }
        let invalid = || ConfigError::Timezone(s.to_string());

        let (sign, rest) = match raw.as_bytes().first() {
            Some(b'+') => (1, &raw[1..]),
            Some(b'-') => (-1, &raw[1..]),
            _ => return Err(invalid()),
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
        let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeZoneSpec {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimeZoneSpec> for String {
    fn from(tz: TimeZoneSpec) -> Self {
        tz.to_string()
    }
}

impl fmt::Display for TimeZoneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.local_minus_utc() == 0 {
            f.write_str("UTC")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Work calendar and cycle settings, typically parsed from env or TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// First working hour of the day (inclusive).
    #[serde(default = "default_work_start_hour")]
    pub work_start_hour: u32,
    /// Hour the working day ends (exclusive).
    #[serde(default = "default_work_end_hour")]
    pub work_end_hour: u32,
    #[serde(default = "default_slot_duration")]
    pub slot_duration_minutes: u32,
    /// How many calendar days ahead slots are generated for.
    #[serde(default = "default_lookahead_days")]
    pub lookahead_days: u32,
    #[serde(default = "default_working_days")]
    pub working_days: Vec<Weekday>,
    #[serde(default)]
    pub timezone: TimeZoneSpec,
    /// Log placements instead of writing them to the store.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Upper bound on one cycle. 0 disables the timeout.
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,
    #[serde(default)]
    pub reschedule_policy: ReschedulePolicy,
    /// Only schedule tasks assigned to this person.
    #[serde(default)]
    pub assignee: Option<String>,
}

fn default_work_start_hour() -> u32 { 9 }
fn default_work_end_hour() -> u32 { 17 }
fn default_slot_duration() -> u32 { 15 }
fn default_lookahead_days() -> u32 { 7 }
fn default_interval_minutes() -> u64 { 10 }
fn default_cycle_timeout() -> u64 { 300 }

fn default_working_days() -> Vec<Weekday> {
    vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            work_start_hour: default_work_start_hour(),
            work_end_hour: default_work_end_hour(),
            slot_duration_minutes: default_slot_duration(),
            lookahead_days: default_lookahead_days(),
            working_days: default_working_days(),
            timezone: TimeZoneSpec::default(),
            dry_run: false,
            interval_minutes: default_interval_minutes(),
            cycle_timeout_secs: default_cycle_timeout(),
            reschedule_policy: ReschedulePolicy::default(),
            assignee: None,
        }
    }
}

/// Parse a comma separated weekday list such as `Mon,Tue,Wed`.
pub fn parse_weekdays(raw: &str) -> Result<Vec<Weekday>, ConfigError> {
    let mut days = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let day: Weekday = part
            .parse()
            .map_err(|_| ConfigError::Weekday(part.to_string()))?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    Ok(days)
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        let working_days = match profiled_env_opt(p, "WORKING_DAYS") {
            Some(raw) => parse_weekdays(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "invalid WORKING_DAYS, using Mon-Fri");
                default_working_days()
            }),
            None => defaults.working_days,
        };
        let timezone = profiled_env_or(p, "SCHEDULER_TIMEZONE", "UTC")
            .parse()
            .unwrap_or_else(|e: ConfigError| {
                tracing::warn!(error = %e, "invalid SCHEDULER_TIMEZONE, using UTC");
                TimeZoneSpec::utc()
            });

        Self {
            work_start_hour: profiled_env_parse(p, "WORK_START_HOUR", defaults.work_start_hour),
            work_end_hour: profiled_env_parse(p, "WORK_END_HOUR", defaults.work_end_hour),
            slot_duration_minutes: profiled_env_parse(
                p,
                "SLOT_DURATION_MINUTES",
                defaults.slot_duration_minutes,
            ),
            lookahead_days: profiled_env_parse(p, "SCHEDULE_DAYS_AHEAD", defaults.lookahead_days),
            working_days,
            timezone,
            dry_run: profiled_env_bool(p, "SCHEDULER_DRY_RUN", false),
            interval_minutes: profiled_env_parse(
                p,
                "SCHEDULER_INTERVAL_MINUTES",
                defaults.interval_minutes,
            ),
            cycle_timeout_secs: profiled_env_parse(
                p,
                "SCHEDULER_CYCLE_TIMEOUT_SECS",
                defaults.cycle_timeout_secs,
            ),
            reschedule_policy: profiled_env_parse(
                p,
                "RESCHEDULE_POLICY",
                defaults.reschedule_policy,
            ),
            assignee: profiled_env_opt(p, "SCHEDULER_ASSIGNEE"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.work_start_hour >= self.work_end_hour || self.work_end_hour > 24 {
            return Err(ConfigError::WorkHours {
                start: self.work_start_hour,
                end: self.work_end_hour,
            });
        }
        let max = self.work_day_minutes();
        if self.slot_duration_minutes == 0 || self.slot_duration_minutes > max {
            return Err(ConfigError::SlotDuration {
                minutes: self.slot_duration_minutes,
                max,
            });
        }
        if self.lookahead_days == 0 {
            return Err(ConfigError::Lookahead);
        }
        if self.working_days.is_empty() {
            return Err(ConfigError::NoWorkingDays);
        }
        if self.interval_minutes == 0 {
            return Err(ConfigError::Interval);
        }
        Ok(())
    }

    pub fn work_day_minutes(&self) -> u32 {
        self.work_end_hour.saturating_sub(self.work_start_hour) * 60
    }

    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_duration_minutes))
    }

    pub fn offset(&self) -> FixedOffset {
        self.timezone.offset()
    }

    pub fn is_working_day(&self, day: Weekday) -> bool {
        self.working_days.contains(&day)
    }

    pub fn interval(&self) -> StdDuration {
        StdDuration::from_secs(self.interval_minutes * 60)
    }

    pub fn cycle_timeout(&self) -> Option<StdDuration> {
        (self.cycle_timeout_secs > 0).then(|| StdDuration::from_secs(self.cycle_timeout_secs))
    }

    pub fn work_hours_label(&self) -> String {
        format!("{}:00 - {}:00", self.work_start_hour, self.work_end_hour)
    }

    pub fn working_days_label(&self) -> String {
        self.working_days
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ── Store field mapping ───────────────────────────────────────

/// Maps each logical task field to the property key used by the external
/// store, so workspaces with different column names share one mapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub name: String,
    pub rank: String,
    pub duration: String,
    pub due: String,
    pub scheduled: String,
    pub status: String,
    pub blocked_by: String,
    pub auto_schedule: String,
    pub assignee: String,
    pub last_scheduled: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            name: "Task name".to_string(),
            rank: "Rank".to_string(),
            duration: "Est Duration Hrs".to_string(),
            due: "Due date".to_string(),
            scheduled: "Scheduled Date".to_string(),
            status: "Status".to_string(),
            blocked_by: "Blocked by".to_string(),
            auto_schedule: "Auto Schedule".to_string(),
            assignee: "Assignee".to_string(),
            last_scheduled: "Last Scheduled".to_string(),
        }
    }
}

impl FieldMapping {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            name: profiled_env_or(p, "FIELD_NAME", &d.name),
            rank: profiled_env_or(p, "FIELD_RANK", &d.rank),
            duration: profiled_env_or(p, "FIELD_DURATION", &d.duration),
            due: profiled_env_or(p, "FIELD_DUE", &d.due),
            scheduled: profiled_env_or(p, "FIELD_SCHEDULED", &d.scheduled),
            status: profiled_env_or(p, "FIELD_STATUS", &d.status),
            blocked_by: profiled_env_or(p, "FIELD_BLOCKED_BY", &d.blocked_by),
            auto_schedule: profiled_env_or(p, "FIELD_AUTO_SCHEDULE", &d.auto_schedule),
            assignee: profiled_env_or(p, "FIELD_ASSIGNEE", &d.assignee),
            last_scheduled: profiled_env_or(p, "FIELD_LAST_SCHEDULED", &d.last_scheduled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SchedulerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.work_hours_label(), "9:00 - 17:00");
        assert_eq!(config.working_days_label(), "Mon,Tue,Wed,Thu,Fri");
        assert_eq!(config.slot_duration(), Duration::minutes(15));
        assert_eq!(config.cycle_timeout(), Some(StdDuration::from_secs(300)));
    }

    #[test]
    fn validate_rejects_inverted_hours() {
        let config = SchedulerConfig {
            work_start_hour: 17,
            work_end_hour: 9,
            ..SchedulerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::WorkHours { .. })));
    }

    #[test]
    fn validate_accepts_day_ending_at_midnight() {
        let config = SchedulerConfig {
            work_end_hour: 24,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_ok());

        let config = SchedulerConfig {
            work_end_hour: 25,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::WorkHours { start: 9, end: 25 })
        ));
    }

    #[test]
    fn validate_rejects_slot_longer_than_day() {
        let config = SchedulerConfig {
            work_start_hour: 9,
            work_end_hour: 10,
            slot_duration_minutes: 90,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SlotDuration { minutes: 90, max: 60 })
        ));
    }

    #[test]
    fn validate_rejects_empty_calendar() {
        let config = SchedulerConfig {
            working_days: vec![],
            ..SchedulerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoWorkingDays)));

        let config = SchedulerConfig {
            lookahead_days: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Lookahead)));
    }

    #[test]
    fn timezone_parsing() {
        assert_eq!("UTC".parse::<TimeZoneSpec>().unwrap().offset().local_minus_utc(), 0);
        assert_eq!("+02:00".parse::<TimeZoneSpec>().unwrap().offset().local_minus_utc(), 7200);
        assert_eq!("-0530".parse::<TimeZoneSpec>().unwrap().offset().local_minus_utc(), -19800);
        assert!("Europe/Berlin".parse::<TimeZoneSpec>().is_err());
        assert!("+25:00".parse::<TimeZoneSpec>().is_err());
    }

    #[test]
    fn weekday_list_parsing() {
        let days = parse_weekdays("Mon, wed,Sat,mon").unwrap();
        assert_eq!(days, vec![Weekday::Mon, Weekday::Wed, Weekday::Sat]);
        assert!(parse_weekdays("Mon,Funday").is_err());
    }

    #[test]
    fn reschedule_policy_parsing() {
        assert_eq!("always".parse::<ReschedulePolicy>().unwrap(), ReschedulePolicy::Always);
        assert_eq!(
            "keep-future".parse::<ReschedulePolicy>().unwrap(),
            ReschedulePolicy::KeepFuture
        );
        assert!("sometimes".parse::<ReschedulePolicy>().is_err());
    }

    #[test]
    fn toml_overrides_merge_with_defaults() {
        let raw = r#"
            [scheduler]
            work_start_hour = 8
            working_days = ["Mon", "Tue"]
            timezone = "+01:00"
            reschedule_policy = "keep_future"

            [fields]
            rank = "Priority"
        "#;
        let config = Config::from_toml_str(raw).unwrap();
        assert_eq!(config.scheduler.work_start_hour, 8);
        assert_eq!(config.scheduler.work_end_hour, 17);
        assert_eq!(config.scheduler.working_days, vec![Weekday::Mon, Weekday::Tue]);
        assert_eq!(config.scheduler.offset().local_minus_utc(), 3600);
        assert_eq!(config.scheduler.reschedule_policy, ReschedulePolicy::KeepFuture);
        assert_eq!(config.fields.rank, "Priority");
        assert_eq!(config.fields.status, "Status");
    }

    #[test]
    fn load_toml_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskslot.toml");
        std::fs::write(&path, "[scheduler]\nslot_duration_minutes = 30\n").unwrap();
        let config = Config::load_toml(&path).unwrap();
        assert_eq!(config.scheduler.slot_duration_minutes, 30);
        config.validate().unwrap();
    }

    #[test]
    fn invalid_timezone_in_toml_is_an_error() {
        let raw = "[scheduler]\ntimezone = \"Mars/Olympus\"\n";
        assert!(Config::from_toml_str(raw).is_err());
    }
}
