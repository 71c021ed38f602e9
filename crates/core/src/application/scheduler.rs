//! Cron Scheduler - one recurring trigger per active scheduled job
//!
//! The scheduler only decides *when* and submits *what*. Runs are handed to
//! a [`RunSubmitter`] (the dispatcher in production); no transfer work is done
//! on the scheduler task.
//!
//! Besides job triggers there is one fixed trigger at 00:00 UTC that produces
//! the daily log report for the previous day.

use crate::application::dispatcher::RunSubmitter;
use crate::application::report::DailyReportService;
use crate::application::worker::constants::SCHEDULER_MAX_SLEEP;
use crate::application::worker::ShutdownToken;
use crate::domain::{CronSpec, DomainError, Job, JobId, RunTrigger};
use crate::error::Result;
use crate::port::{JobRepository, TimeProvider};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Cron expression of the daily report trigger
pub const DAILY_REPORT_SCHEDULE: &str = "0 0 * * *";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKey {
    Job(JobId),
    DailyReport,
}

struct Trigger {
    schedule: Schedule,
    expression: String,
    next_fire: Option<DateTime<Utc>>,
}

pub struct CronScheduler {
    jobs: Arc<dyn JobRepository>,
    submitter: Arc<dyn RunSubmitter>,
    report: Option<Arc<DailyReportService>>,
    time_provider: Arc<dyn TimeProvider>,
    triggers: Mutex<HashMap<TriggerKey, Trigger>>,
    changed: Notify,
}

impl CronScheduler {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        submitter: Arc<dyn RunSubmitter>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            jobs,
            submitter,
            report: None,
            time_provider,
            triggers: Mutex::new(HashMap::new()),
            changed: Notify::new(),
        }
    }

    pub fn with_daily_report(mut self, report: Arc<DailyReportService>) -> Self {
        self.report = Some(report);
        self
    }

    /// Rebuild the trigger table from the job store
    ///
    /// A job with an unusable schedule is logged and skipped. Returns false
    /// only when the job store itself could not be read.
    pub async fn initialize(&self) -> bool {
        self.lock_triggers().clear();

        // The report trigger does not depend on the job store
        if let Err(e) = self.insert(TriggerKey::DailyReport, DAILY_REPORT_SCHEDULE) {
            error!(error = %e, "Failed to register daily report trigger");
        }

        let jobs = match self.jobs.find_active_scheduled().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to load scheduled jobs");
                self.changed.notify_one();
                return false;
            }
        };

        let mut registered = 0usize;
        for job in &jobs {
            match self.register(job) {
                Ok(()) => registered += 1,
                Err(e) => warn!(
                    job_id = job.id,
                    schedule = ?job.schedule,
                    error = %e,
                    "Skipping job with invalid schedule"
                ),
            }
        }

        info!(
            registered,
            skipped = jobs.len() - registered,
            "Scheduler initialized"
        );
        self.changed.notify_one();
        true
    }

    /// Re-read one job and replace its trigger
    ///
    /// Returns whether the job has a trigger afterwards. An invalid schedule
    /// leaves the job without a trigger and is returned as an error.
    pub async fn update_schedule(&self, job_id: JobId) -> Result<bool> {
        let removed = self.lock_triggers().remove(&TriggerKey::Job(job_id)).is_some();
        if removed {
            debug!(job_id, "Removed existing trigger");
        }

        let job = self.jobs.find_by_id(job_id).await?;
        let registered = match job {
            Some(job) if job.is_schedulable() => {
                self.register(&job)?;
                true
            }
            _ => false,
        };

        info!(job_id, registered, "Schedule updated");
        self.changed.notify_one();
        Ok(registered)
    }

    fn register(&self, job: &Job) -> std::result::Result<(), DomainError> {
        let expression = job
            .cron_expression()
            .ok_or_else(|| DomainError::Configuration(format!("job {} has no schedule", job.id)))?;
        self.insert(TriggerKey::Job(job.id), expression)?;
        debug!(job_id = job.id, schedule = expression, "Trigger registered");
        Ok(())
    }

    fn insert(&self, key: TriggerKey, expression: &str) -> std::result::Result<(), DomainError> {
        let spec = CronSpec::parse(expression)?;
        let schedule = spec.to_schedule()?;
        let next_fire = CronSpec::next_after(&schedule, &self.now());
        self.lock_triggers().insert(
            key,
            Trigger {
                schedule,
                expression: spec.to_string(),
                next_fire,
            },
        );
        Ok(())
    }

    /// Fire every trigger whose time has come, at most once each
    ///
    /// Missed fire times (e.g. after a long pause) collapse into a single
    /// fire; the next fire time is computed from the current time.
    pub async fn fire_due(&self) -> Vec<TriggerKey> {
        let now = self.now();
        let due: Vec<TriggerKey> = {
            let mut triggers = self.lock_triggers();
            triggers
                .iter_mut()
                .filter(|(_, t)| t.next_fire.map_or(false, |at| at <= now))
                .map(|(key, t)| {
                    t.next_fire = CronSpec::next_after(&t.schedule, &now);
                    *key
                })
                .collect()
        };

        for key in &due {
            match *key {
                TriggerKey::Job(job_id) => {
                    match self.submitter.submit(job_id, RunTrigger::Scheduled).await {
                        Ok(handle) => info!(job_id, handle_id = %handle.id, "Scheduled run submitted"),
                        Err(e) => error!(job_id, error = %e, "Failed to submit scheduled run"),
                    }
                }
                TriggerKey::DailyReport => self.spawn_daily_report(now),
            }
        }
        due
    }

    fn spawn_daily_report(&self, now: DateTime<Utc>) {
        let Some(report) = self.report.clone() else {
            debug!("Daily report trigger fired without a report service");
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = report.generate_previous_day(now).await {
                error!(error = %e, "Daily report failed");
            }
        });
    }

    /// Earliest pending fire time
    pub fn next_wake(&self) -> Option<DateTime<Utc>> {
        self.lock_triggers()
            .values()
            .filter_map(|t| t.next_fire)
            .min()
    }

    pub fn next_fire(&self, key: TriggerKey) -> Option<DateTime<Utc>> {
        self.lock_triggers().get(&key).and_then(|t| t.next_fire)
    }

    /// Normalized 5-field expression behind a trigger
    pub fn expression(&self, key: TriggerKey) -> Option<String> {
        self.lock_triggers().get(&key).map(|t| t.expression.clone())
    }

    /// Number of job triggers (the daily report trigger is not counted)
    pub fn trigger_count(&self) -> usize {
        self.lock_triggers()
            .keys()
            .filter(|k| matches!(k, TriggerKey::Job(_)))
            .count()
    }

    /// Scheduler loop; wakes for the next fire time, a trigger change or shutdown
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!("Scheduler started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            self.fire_due().await;

            let sleep = self.sleep_duration();
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = self.changed.notified() => debug!("Trigger table changed"),
                _ = shutdown.wait() => break,
            }
        }
        info!("Scheduler stopped");
    }

    fn sleep_duration(&self) -> Duration {
        match self.next_wake() {
            Some(at) => (at - self.now())
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(SCHEDULER_MAX_SLEEP),
            None => SCHEDULER_MAX_SLEEP,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.time_provider.now_millis()).unwrap_or_else(Utc::now)
    }

    fn lock_triggers(&self) -> std::sync::MutexGuard<'_, HashMap<TriggerKey, Trigger>> {
        self.triggers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::mocks::RecordingSubmitter;
    use crate::domain::JobType;
    use crate::port::job_repository::mocks::MemoryJobRepository;
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use serde_json::json;

    // 2023-11-14T22:13:20Z
    const NOW: i64 = 1_700_000_000_000;

    fn job(schedule: &str) -> Job {
        Job::new_test(JobType::DirectoryTransfer, json!({})).with_schedule(schedule)
    }

    struct Fixture {
        jobs: Arc<MemoryJobRepository>,
        submitter: Arc<RecordingSubmitter>,
        clock: Arc<FixedTimeProvider>,
        scheduler: CronScheduler,
    }

    fn fixture(jobs: Vec<Job>) -> Fixture {
        let jobs = Arc::new(MemoryJobRepository::with_jobs(jobs));
        let submitter = Arc::new(RecordingSubmitter::new());
        let clock = Arc::new(FixedTimeProvider::new(NOW));
        let scheduler = CronScheduler::new(jobs.clone(), submitter.clone(), clock.clone());
        Fixture {
            jobs,
            submitter,
            clock,
            scheduler,
        }
    }

    #[tokio::test]
    async fn test_initialize_skips_bad_schedules() {
        let good = job("*/5 * * * *");
        let weekly = job("30 6 * * 1");
        let bad = job("0 0 * *");
        let paused = job("* * * * *").inactive();
        let manual = Job::new_test(JobType::QueryExport, json!({}));
        let f = fixture(vec![good.clone(), weekly.clone(), bad.clone(), paused, manual]);

        assert!(f.scheduler.initialize().await);

        assert_eq!(f.scheduler.trigger_count(), 2);
        assert!(f.scheduler.next_fire(TriggerKey::Job(good.id)).is_some());
        assert!(f.scheduler.next_fire(TriggerKey::Job(weekly.id)).is_some());
        assert!(f.scheduler.next_fire(TriggerKey::Job(bad.id)).is_none());
        assert!(f.scheduler.next_fire(TriggerKey::DailyReport).is_some());
    }

    #[tokio::test]
    async fn test_unreadable_job_store_keeps_daily_report() {
        let scheduled = job("0 * * * *");
        let f = fixture(vec![scheduled.clone()]);
        assert!(f.scheduler.initialize().await);

        f.jobs.set_unavailable(true);
        assert!(!f.scheduler.initialize().await);

        assert_eq!(f.scheduler.trigger_count(), 0);
        assert!(f.scheduler.next_fire(TriggerKey::Job(scheduled.id)).is_none());
        assert!(f.scheduler.next_fire(TriggerKey::DailyReport).is_some());
    }

    #[tokio::test]
    async fn test_initialize_clears_previous_triggers() {
        let scheduled = job("0 * * * *");
        let f = fixture(vec![scheduled.clone()]);
        assert!(f.scheduler.initialize().await);
        assert_eq!(f.scheduler.trigger_count(), 1);

        f.jobs.remove(scheduled.id);
        assert!(f.scheduler.initialize().await);
        assert_eq!(f.scheduler.trigger_count(), 0);
    }

    #[tokio::test]
    async fn test_fire_due_submits_scheduled_run_once() {
        let every_five = job("*/5 * * * *");
        let f = fixture(vec![every_five.clone()]);
        f.scheduler.initialize().await;

        // Next fire is 22:15:00, 100 seconds away
        assert!(f.scheduler.fire_due().await.is_empty());
        f.clock.advance(100_000);

        let fired = f.scheduler.fire_due().await;
        assert_eq!(fired, vec![TriggerKey::Job(every_five.id)]);
        assert_eq!(
            f.submitter.submitted(),
            vec![(every_five.id, RunTrigger::Scheduled)]
        );

        assert!(f.scheduler.fire_due().await.is_empty());
        let next = f.scheduler.next_fire(TriggerKey::Job(every_five.id)).unwrap();
        assert_eq!(next.timestamp_millis(), NOW + 100_000 + 300_000);
    }

    #[tokio::test]
    async fn test_update_schedule_replaces_and_removes() {
        let edited = job("0 * * * *");
        let f = fixture(vec![edited.clone()]);
        f.scheduler.initialize().await;
        let hourly = f.scheduler.next_fire(TriggerKey::Job(edited.id)).unwrap();

        f.jobs.put(edited.clone().with_schedule("*/5 * * * *"));
        assert!(f.scheduler.update_schedule(edited.id).await.unwrap());
        let five = f.scheduler.next_fire(TriggerKey::Job(edited.id)).unwrap();
        assert!(five < hourly);
        assert_eq!(
            f.scheduler.expression(TriggerKey::Job(edited.id)).as_deref(),
            Some("*/5 * * * *")
        );

        f.jobs.put(edited.clone().inactive());
        assert!(!f.scheduler.update_schedule(edited.id).await.unwrap());
        assert_eq!(f.scheduler.trigger_count(), 0);

        // Unknown job: removing is a no-op
        assert!(!f.scheduler.update_schedule(9_999_999).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_schedule_rejects_bad_expression() {
        let edited = job("0 * * * *");
        let f = fixture(vec![edited.clone()]);
        f.scheduler.initialize().await;

        f.jobs.put(edited.clone().with_schedule("0 0 * * * *"));
        let err = f.scheduler.update_schedule(edited.id).await.unwrap_err();
        assert!(err.to_string().contains("Expected 5 parts"));
        assert_eq!(f.scheduler.trigger_count(), 0);
    }

    #[tokio::test]
    async fn test_daily_report_fires_at_midnight_utc() {
        let f = fixture(vec![]);
        f.scheduler.initialize().await;

        let midnight = f.scheduler.next_fire(TriggerKey::DailyReport).unwrap();
        assert_eq!(midnight.to_rfc3339(), "2023-11-15T00:00:00+00:00");

        f.clock.set(midnight.timestamp_millis());
        assert_eq!(f.scheduler.fire_due().await, vec![TriggerKey::DailyReport]);
        assert!(f.submitter.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_sleep_is_capped() {
        let f = fixture(vec![]);
        assert_eq!(f.scheduler.sleep_duration(), SCHEDULER_MAX_SLEEP);
        f.scheduler.initialize().await;
        assert_eq!(f.scheduler.sleep_duration(), SCHEDULER_MAX_SLEEP);
    }
}
