// Job Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job ID (store-assigned)
pub type JobId = i64;

/// Owning user ID
pub type UserId = i64;

/// Last known run status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

impl JobStatus {
    /// Success and Failure end a run; Skipped never starts one
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
            JobStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILURE" => Ok(JobStatus::Failure),
            "SKIPPED" => Ok(JobStatus::Skipped),
            other => Err(DomainError::ValidationError(format!(
                "Unknown job status: {}",
                other
            ))),
        }
    }
}

/// Job Type
///
/// Closed set: every variant is bound to exactly one transfer strategy.
/// Unknown tags are rejected when a stored job is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "sftp_transfer")]
    DirectoryTransfer,
    #[serde(rename = "sql_to_csv")]
    QueryExport,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::DirectoryTransfer => "sftp_transfer",
            JobType::QueryExport => "sql_to_csv",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sftp_transfer" => Ok(JobType::DirectoryTransfer),
            "sql_to_csv" => Ok(JobType::QueryExport),
            other => Err(DomainError::UnknownJobType(other.to_string())),
        }
    }
}

/// Job configuration as stored (JSON object)
///
/// Opaque to the engine; only the strategy matching the job type
/// interprets it (see [`crate::domain::JobConfig`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn empty() -> Self {
        Self(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub job_type: JobType,
    /// 5-field cron expression; `None` or blank means manual only
    pub schedule: Option<String>,
    pub active: bool,
    pub config: JobPayload,

    pub last_run: Option<i64>, // epoch ms, terminal runs only
    pub last_status: JobStatus,

    pub user_id: UserId,
    pub source_credential_id: i64,
    pub destination_credential_id: i64,

    pub created_at: i64, // epoch ms
}

impl Job {
    /// Create a new job
    ///
    /// `id` and `created_at` are injected; production code gets them from
    /// the store and the TimeProvider.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: JobId,
        created_at: i64,
        name: impl Into<String>,
        job_type: JobType,
        config: JobPayload,
        user_id: UserId,
        source_credential_id: i64,
        destination_credential_id: i64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            job_type,
            schedule: None,
            active: true,
            config,
            last_run: None,
            last_status: JobStatus::Pending,
            user_id,
            source_credential_id,
            destination_credential_id,
            created_at,
        }
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Non-blank schedule, if any
    pub fn cron_expression(&self) -> Option<&str> {
        self.schedule
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether the scheduler should keep a trigger for this job
    pub fn is_schedulable(&self) -> bool {
        self.active && self.cron_expression().is_some()
    }

    /// Transition to Running at the start of a run
    ///
    /// A stored RUNNING status does not block: concurrent runs of one job
    /// are allowed and the last terminal write wins.
    pub fn begin_run(&mut self) -> Result<()> {
        if !self.active {
            return Err(DomainError::InvalidStateTransition {
                from: format!("{} (inactive)", self.last_status),
                to: JobStatus::Running.to_string(),
            });
        }
        self.last_status = JobStatus::Running;
        Ok(())
    }

    /// Transition from Running to a terminal status, advancing `last_run`
    pub fn finish_run(&mut self, status: JobStatus, now_millis: i64) -> Result<()> {
        if self.last_status != JobStatus::Running || !status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.last_status.to_string(),
                to: status.to_string(),
            });
        }
        self.last_status = status;
        self.last_run = Some(now_millis);
        Ok(())
    }
}

impl Job {
    /// Create a test job with a deterministic ID (for tests only)
    ///
    /// IDs come from a process-wide counter; `created_at` is `id * 1000`.
    pub fn new_test(job_type: JobType, config: serde_json::Value) -> Self {
        use std::sync::atomic::{AtomicI64, Ordering};
        static TEST_COUNTER: AtomicI64 = AtomicI64::new(1);

        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            id,
            id * 1000,
            format!("test-job-{}", id),
            job_type,
            JobPayload::new(config),
            1,
            10,
            20,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_type_tags() {
        assert_eq!(
            "sftp_transfer".parse::<JobType>().unwrap(),
            JobType::DirectoryTransfer
        );
        assert_eq!("sql_to_csv".parse::<JobType>().unwrap(), JobType::QueryExport);
        assert_eq!(
            "ftp_mirror".parse::<JobType>().unwrap_err(),
            DomainError::UnknownJobType("ftp_mirror".to_string())
        );
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Success,
            JobStatus::Failure,
            JobStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_run_transitions() {
        let mut job = Job::new_test(JobType::DirectoryTransfer, json!({}));
        assert!(job.finish_run(JobStatus::Success, 10).is_err());

        job.begin_run().unwrap();
        assert_eq!(job.last_status, JobStatus::Running);
        assert_eq!(job.last_run, None);

        assert!(job.finish_run(JobStatus::Pending, 10).is_err());
        job.finish_run(JobStatus::Failure, 10).unwrap();
        assert_eq!(job.last_status, JobStatus::Failure);
        assert_eq!(job.last_run, Some(10));
    }

    #[test]
    fn test_inactive_job_cannot_start() {
        let mut job = Job::new_test(JobType::QueryExport, json!({})).inactive();
        assert!(matches!(
            job.begin_run(),
            Err(DomainError::InvalidStateTransition { .. })
        ));
        assert_eq!(job.last_status, JobStatus::Pending);
    }

    #[test]
    fn test_blank_schedule_is_not_schedulable() {
        let job = Job::new_test(JobType::DirectoryTransfer, json!({})).with_schedule("   ");
        assert!(!job.is_schedulable());

        let job = Job::new_test(JobType::DirectoryTransfer, json!({})).with_schedule("0 0 * * *");
        assert!(job.is_schedulable());
        assert!(!job.inactive().is_schedulable());
    }
}
