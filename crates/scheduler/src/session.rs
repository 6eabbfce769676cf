//! Scheduler session -- single-flight cycle execution and last-run state.
//!
//! The session is the one owner of the allocator. Cycles are serialized
//! through an async mutex: [`SchedulerSession::run_cycle`] queues behind a
//! running cycle, [`SchedulerSession::try_run_cycle`] coalesces into it.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use taskslot_core::{ReschedulePolicy, SchedulerConfig, StoreError, TaskStore, Timestamp};

use crate::allocator::Allocator;
use crate::stats::{CycleStats, SessionMetrics};

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    /// The batch could not be fetched; nothing was processed.
    FetchFailed(String),
    /// The cycle exceeded its time limit. Writes made before that remain.
    TimedOut,
}

/// Result of one cycle as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub duration_ms: u64,
    pub stats: CycleStats,
    pub outcome: CycleOutcome,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.outcome == CycleOutcome::Completed && !self.stats.has_errors()
    }
}

/// Effective configuration plus last-run information.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub last_run: Option<Timestamp>,
    pub last_stats: Option<CycleStats>,
    pub last_outcome: Option<CycleOutcome>,
    pub cycle_running: bool,
    pub work_hours: String,
    pub working_days: String,
    pub slot_duration_minutes: u32,
    pub schedule_days_ahead: u32,
    pub timezone: String,
    pub dry_run: bool,
    pub reschedule_policy: ReschedulePolicy,
    pub interval_minutes: u64,
    pub metrics: SessionMetrics,
}

pub struct SchedulerSession {
    config: SchedulerConfig,
    store: Arc<dyn TaskStore>,
    allocator: Mutex<Allocator>,
    last_result: RwLock<Option<CycleReport>>,
    metrics: RwLock<SessionMetrics>,
}

impl SchedulerSession {
    pub fn new(config: SchedulerConfig, store: Arc<dyn TaskStore>) -> Self {
        let allocator = Allocator::new(config.clone());
        Self {
            config,
            store,
            allocator: Mutex::new(allocator),
            last_result: RwLock::new(None),
            metrics: RwLock::new(SessionMetrics::default()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Current wall-clock time in the configured offset.
    pub fn now(&self) -> Timestamp {
        Utc::now().with_timezone(&self.config.offset())
    }

    /// Run a cycle now, waiting for a running cycle to finish first.
    pub async fn run_cycle(&self) -> CycleReport {
        let now = self.now();
        self.run_cycle_at(now).await
    }

    /// Run a cycle with an explicit notion of "now".
    pub async fn run_cycle_at(&self, now: Timestamp) -> CycleReport {
        let mut allocator = self.allocator.lock().await;
        self.execute(&mut allocator, now).await
    }

    /// Run a cycle unless one is already in progress.
    ///
    /// Returns `None` when the trigger was coalesced into the running cycle.
    pub async fn try_run_cycle(&self) -> Option<CycleReport> {
        let now = self.now();
        self.try_run_cycle_at(now).await
    }

    pub async fn try_run_cycle_at(&self, now: Timestamp) -> Option<CycleReport> {
        let Ok(mut allocator) = self.allocator.try_lock() else {
            info!("Scheduling cycle already running, trigger coalesced");
            return None;
        };
        Some(self.execute(&mut allocator, now).await)
    }

    /// Report of the most recent finished cycle.
    pub fn get_last_result(&self) -> Option<CycleReport> {
        self.last_result
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status(&self) -> SchedulerStatus {
        let last = self.get_last_result();
        SchedulerStatus {
            last_run: last.as_ref().map(|r| r.finished_at),
            last_stats: last.as_ref().map(|r| r.stats),
            last_outcome: last.map(|r| r.outcome),
            cycle_running: self.allocator.try_lock().is_err(),
            work_hours: self.config.work_hours_label(),
            working_days: self.config.working_days_label(),
            slot_duration_minutes: self.config.slot_duration_minutes,
            schedule_days_ahead: self.config.lookahead_days,
            timezone: self.config.timezone.to_string(),
            dry_run: self.config.dry_run,
            reschedule_policy: self.config.reschedule_policy,
            interval_minutes: self.config.interval_minutes,
            metrics: self.metrics(),
        }
    }

    /// Run a cycle every configured interval until `shutdown` resolves.
    ///
    /// The first cycle starts immediately. A cycle in progress is allowed
    /// to finish before shutdown is honoured.
    pub async fn run_continuous<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Scheduler running every {} minutes",
            self.config.interval_minutes
        );

        let mut interval = tokio::time::interval(self.config.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycle_number: u64 = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    cycle_number += 1;
                    info!(cycle = cycle_number, "Cycle #{} starting", cycle_number);
                    let report = self.run_cycle().await;
                    if !report.is_success() {
                        warn!(cycle = cycle_number, outcome = ?report.outcome, errors = report.stats.errors, "Cycle #{} finished with errors", cycle_number);
                    }
                }
            }
        }

        info!(cycles = cycle_number, "Scheduler stopped");
    }

    async fn execute(&self, allocator: &mut Allocator, now: Timestamp) -> CycleReport {
        let clock = Instant::now();
        let cycle = allocator.run_cycle(self.store.as_ref(), now);

        let (stats, outcome) = match self.config.cycle_timeout() {
            Some(limit) => match tokio::time::timeout(limit, cycle).await {
                Ok(result) => settle(result),
                Err(_) => {
                    error!(
                        timeout_secs = self.config.cycle_timeout_secs,
                        "Scheduling cycle timed out, earlier writes are kept"
                    );
                    let stats = CycleStats {
                        errors: 1,
                        ..CycleStats::default()
                    };
                    (stats, CycleOutcome::TimedOut)
                }
            },
            None => settle(cycle.await),
        };

        let elapsed = clock.elapsed();
        let report = CycleReport {
            started_at: now,
            finished_at: now + chrono::Duration::from_std(elapsed).unwrap_or_default(),
            duration_ms: elapsed.as_millis() as u64,
            stats,
            outcome,
        };

        info!(
            duration_ms = report.duration_ms,
            "Cycle complete: {}", report.stats
        );
        self.record(&report, elapsed);
        report
    }

    fn record(&self, report: &CycleReport, elapsed: std::time::Duration) {
        {
            let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
            match report.outcome {
                CycleOutcome::FetchFailed(_) => metrics.record_fetch_failure(),
                CycleOutcome::TimedOut => metrics.record_timeout(),
                CycleOutcome::Completed => {}
            }
            metrics.record_cycle(&report.stats, elapsed);
        }
        let mut last = self.last_result.write().unwrap_or_else(|e| e.into_inner());
        *last = Some(report.clone());
    }
}

fn settle(result: Result<CycleStats, StoreError>) -> (CycleStats, CycleOutcome) {
    match result {
        Ok(stats) => (stats, CycleOutcome::Completed),
        Err(e) => {
            error!(error = %e, "Failed to fetch tasks, cycle aborted");
            (CycleStats::fetch_failed(), CycleOutcome::FetchFailed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::DateTime;
    use tokio::sync::Notify;

    use taskslot_core::{Task, TaskBatch, TaskId, TimeWindow};

    use super::*;
    use crate::memory::InMemoryTaskStore;

    fn ts(s: &str) -> Timestamp {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn monday_morning() -> Timestamp {
        ts("2026-10-19T08:00:00Z")
    }

    /// Store whose fetch waits until released, to hold a cycle open.
    struct GatedStore {
        started: Notify,
        release: Notify,
        delay: Option<Duration>,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                started: Notify::new(),
                release: Notify::new(),
                delay: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new()
            }
        }
    }

    #[async_trait::async_trait]
    impl TaskStore for GatedStore {
        fn name(&self) -> &str {
            "gated"
        }

        async fn fetch_schedulable_tasks(&self) -> Result<TaskBatch, StoreError> {
            self.started.notify_one();
            match self.delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => self.release.notified().await,
            }
            Ok(TaskBatch::new(vec![Task::new("a", "A").with_duration(1.0)]))
        }

        async fn write_scheduled_window(
            &self,
            _task_id: &TaskId,
            _window: TimeWindow,
            _scheduled_at: Timestamp,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cycle_report_is_kept_as_last_result() {
        let store = Arc::new(InMemoryTaskStore::new(vec![
            Task::new("a", "A").with_rank(1.0).with_duration(1.0),
        ]));
        let session = SchedulerSession::new(SchedulerConfig::default(), store.clone());
        assert!(session.get_last_result().is_none());

        let report = session.run_cycle_at(monday_morning()).await;
        assert_eq!(report.outcome, CycleOutcome::Completed);
        assert_eq!(report.stats.scheduled, 1);
        assert_eq!(report.started_at, monday_morning());
        assert!(report.finished_at >= report.started_at);

        let last = session.get_last_result().unwrap();
        assert_eq!(last.stats, report.stats);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_not_raised() {
        let store = Arc::new(InMemoryTaskStore::new(vec![Task::new("a", "A").with_duration(1.0)]));
        store.set_fetch_failure(true);
        let session = SchedulerSession::new(SchedulerConfig::default(), store.clone());

        let report = session.run_cycle_at(monday_morning()).await;
        assert!(matches!(report.outcome, CycleOutcome::FetchFailed(_)));
        assert_eq!(report.stats, CycleStats::fetch_failed());
        assert!(store.writes().is_empty());
        assert_eq!(session.metrics().cycles_failed, 1);
    }

    #[tokio::test]
    async fn second_cycle_of_unchanged_batch_writes_nothing() {
        let store = Arc::new(InMemoryTaskStore::new(vec![
            Task::new("a", "A").with_rank(1.0).with_duration(1.0),
            Task::new("b", "B").with_rank(2.0).with_duration(0.5),
        ]));
        let session = SchedulerSession::new(SchedulerConfig::default(), store.clone());

        let first = session.run_cycle_at(monday_morning()).await;
        assert_eq!(first.stats.scheduled, 2);
        let second = session.run_cycle_at(monday_morning()).await;
        assert_eq!(second.stats.scheduled + second.stats.rescheduled, 0);
        assert_eq!(second.stats.skipped, 2);
        assert_eq!(store.writes().len(), 2);
        assert_eq!(session.metrics().cycles_run, 2);
    }

    #[tokio::test]
    async fn concurrent_trigger_is_coalesced() {
        let store = Arc::new(GatedStore::new());
        let session = Arc::new(SchedulerSession::new(SchedulerConfig::default(), store.clone()));

        let running = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.run_cycle_at(monday_morning()).await })
        };

        store.started.notified().await;
        assert!(session.status().cycle_running);
        assert!(session.try_run_cycle_at(monday_morning()).await.is_none());

        store.release.notify_one();
        let report = running.await.unwrap();
        assert_eq!(report.outcome, CycleOutcome::Completed);

        // Idle again: the trigger now runs.
        store.release.notify_one();
        assert!(session.try_run_cycle_at(monday_morning()).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_cycle_times_out() {
        let config = SchedulerConfig {
            cycle_timeout_secs: 1,
            ..SchedulerConfig::default()
        };
        let store = Arc::new(GatedStore::slow(Duration::from_secs(30)));
        let session = SchedulerSession::new(config, store);

        let report = session.run_cycle_at(monday_morning()).await;
        assert_eq!(report.outcome, CycleOutcome::TimedOut);
        assert_eq!(report.stats.errors, 1);
        assert_eq!(session.metrics().cycles_timed_out, 1);
    }

    #[tokio::test]
    async fn status_reflects_config_and_last_run() {
        let config = SchedulerConfig {
            dry_run: true,
            ..SchedulerConfig::default()
        };
        let store = Arc::new(InMemoryTaskStore::new(vec![Task::new("a", "A").with_duration(1.0)]));
        let session = SchedulerSession::new(config, store.clone());

        let status = session.status();
        assert!(status.last_run.is_none());
        assert_eq!(status.work_hours, "9:00 - 17:00");
        assert_eq!(status.slot_duration_minutes, 15);
        assert_eq!(status.schedule_days_ahead, 7);
        assert!(status.dry_run);
        assert!(!status.cycle_running);

        session.run_cycle_at(monday_morning()).await;
        let status = session.status();
        assert_eq!(status.last_stats.map(|s| s.scheduled), Some(1));
        assert_eq!(status.last_outcome, Some(CycleOutcome::Completed));
        // Dry run never writes.
        assert!(store.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_loop_stops_on_shutdown() {
        let store = Arc::new(InMemoryTaskStore::new(vec![Task::new("a", "A").with_duration(1.0)]));
        let session = SchedulerSession::new(SchedulerConfig::default(), store);

        // Two ticks (t=0 and t=10min) fit before shutdown at 15 minutes.
        session
            .run_continuous(tokio::time::sleep(Duration::from_secs(15 * 60)))
            .await;

        assert_eq!(session.metrics().cycles_run, 2);
        assert!(session.get_last_result().is_some());
    }
}
