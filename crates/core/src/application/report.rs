// Daily Report - per-job aggregation of the previous UTC day's log records

use crate::domain::{JobId, LogEntry, LogStatus, TimeRange};
use crate::error::{AppError, Result};
use crate::port::{JobRepository, LogRepository};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_id: JobId,
    /// `None` when the job was deleted after logging
    pub job_name: Option<String>,
    pub success: u32,
    pub failure: u32,
    pub warning: u32,
    pub info: u32,
    pub last_status: Option<LogStatus>,
    pub last_message_at: Option<i64>,
}

impl JobSummary {
    fn record(&mut self, entry: &LogEntry) {
        match entry.status {
            LogStatus::Success => self.success += 1,
            LogStatus::Failure => self.failure += 1,
            LogStatus::Warning => self.warning += 1,
            LogStatus::Info => self.info += 1,
        }
        if self.last_message_at.map_or(true, |t| entry.timestamp >= t) {
            self.last_message_at = Some(entry.timestamp);
            self.last_status = Some(entry.status);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyReport {
    pub day: NaiveDate,
    pub jobs: Vec<JobSummary>,
}

impl DailyReport {
    pub fn total_failures(&self) -> u32 {
        self.jobs.iter().map(|j| j.failure).sum()
    }
}

pub struct DailyReportService {
    jobs: Arc<dyn JobRepository>,
    logs: Arc<dyn LogRepository>,
}

impl DailyReportService {
    pub fn new(jobs: Arc<dyn JobRepository>, logs: Arc<dyn LogRepository>) -> Self {
        Self { jobs, logs }
    }

    /// Report on the UTC day before `now`
    pub async fn generate_previous_day(&self, now: DateTime<Utc>) -> Result<DailyReport> {
        let day = now.date_naive() - Duration::days(1);
        self.generate(day).await
    }

    /// Aggregate the log records of one UTC day and emit the summary
    pub async fn generate(&self, day: NaiveDate) -> Result<DailyReport> {
        let start = day
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::Validation(format!("invalid report day {}", day)))?
            .and_utc()
            .timestamp_millis();
        let range = TimeRange::between(start, start + Duration::days(1).num_milliseconds());

        let entries = self.logs.find_in_range(range).await?;
        let names: HashMap<JobId, String> = self
            .jobs
            .find_all()
            .await?
            .into_iter()
            .map(|j| (j.id, j.name))
            .collect();

        let mut per_job: BTreeMap<JobId, JobSummary> = BTreeMap::new();
        for entry in &entries {
            per_job
                .entry(entry.job_id)
                .or_insert_with(|| JobSummary {
                    job_id: entry.job_id,
                    job_name: names.get(&entry.job_id).cloned(),
                    ..Default::default()
                })
                .record(entry);
        }

        let report = DailyReport {
            day,
            jobs: per_job.into_values().collect(),
        };

        for job in &report.jobs {
            info!(
                day = %report.day,
                job_id = job.job_id,
                job_name = job.job_name.as_deref().unwrap_or("<deleted>"),
                success = job.success,
                failure = job.failure,
                warning = job.warning,
                info = job.info,
                last_status = ?job.last_status,
                last_message_at = ?job.last_message_at,
                "Daily job summary"
            );
        }
        info!(
            day = %report.day,
            jobs = report.jobs.len(),
            records = entries.len(),
            failures = report.total_failures(),
            "Daily report generated"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, JobType, NewLogEntry};
    use crate::port::job_repository::mocks::MemoryJobRepository;
    use crate::port::log_repository::mocks::MemoryLogRepository;
    use serde_json::json;

    // 2023-11-14T00:00:00Z
    const DAY_START: i64 = 1_699_920_000_000;

    async fn log(logs: &MemoryLogRepository, job_id: JobId, status: LogStatus, at: i64) {
        logs.append(&NewLogEntry::new(job_id, status, "m", at))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_groups_previous_day_per_job() {
        let a = Job::new_test(JobType::DirectoryTransfer, json!({}));
        let b = Job::new_test(JobType::QueryExport, json!({}));
        let jobs = Arc::new(MemoryJobRepository::with_jobs([a.clone(), b.clone()]));
        let logs = Arc::new(MemoryLogRepository::new());

        log(&logs, a.id, LogStatus::Info, DAY_START + 10).await;
        log(&logs, a.id, LogStatus::Success, DAY_START + 20).await;
        log(&logs, a.id, LogStatus::Info, DAY_START + 30).await;
        log(&logs, a.id, LogStatus::Failure, DAY_START + 40).await;
        log(&logs, b.id, LogStatus::Warning, DAY_START + 50).await;
        // Outside the day on both ends
        log(&logs, b.id, LogStatus::Failure, DAY_START - 1).await;
        log(&logs, b.id, LogStatus::Failure, DAY_START + 86_400_000).await;

        let service = DailyReportService::new(jobs, logs);
        let now = DateTime::from_timestamp_millis(DAY_START + 86_400_000).unwrap();
        let report = service.generate_previous_day(now).await.unwrap();

        assert_eq!(report.day.to_string(), "2023-11-14");
        assert_eq!(report.jobs.len(), 2);

        let first = &report.jobs[0];
        assert_eq!(first.job_id, a.id);
        assert_eq!((first.success, first.failure, first.info), (1, 1, 2));
        assert_eq!(first.last_status, Some(LogStatus::Failure));
        assert_eq!(first.last_message_at, Some(DAY_START + 40));

        let second = &report.jobs[1];
        assert_eq!(second.warning, 1);
        assert_eq!(second.failure, 0);
        assert_eq!(report.total_failures(), 1);
    }

    #[tokio::test]
    async fn test_deleted_job_keeps_its_records() {
        let jobs = Arc::new(MemoryJobRepository::new());
        let logs = Arc::new(MemoryLogRepository::new());
        log(&logs, 42, LogStatus::Success, DAY_START + 5).await;

        let report = DailyReportService::new(jobs, logs)
            .generate(NaiveDate::from_ymd_opt(2023, 11, 14).unwrap())
            .await
            .unwrap();

        assert_eq!(report.jobs[0].job_name, None);
        assert_eq!(report.jobs[0].success, 1);
    }
}
