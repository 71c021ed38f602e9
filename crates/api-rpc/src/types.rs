//! RPC Request/Response Types

use courier_core::domain::{CredentialId, JobId, JobStatus, LogEntry, RunTrigger, TaskHandle};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_LIMIT: u32 = 100;
pub const MAX_LOG_LIMIT: u32 = 1000;

/// job.run.v1 - Trigger a run now
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobRequest {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobResponse {
    pub job_id: JobId,
    pub handle_id: String,
    pub submitted_at: i64,
    pub status: JobStatus,
    pub trigger: RunTrigger,
}

/// job.tasks.v1 - Task handle history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksRequest {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksResponse {
    pub job_id: JobId,
    pub tasks: Vec<TaskHandle>,
}

/// job.logs.v1 - Log records of a job, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsRequest {
    pub job_id: JobId,
    /// Inclusive lower bound, epoch ms
    #[serde(default)]
    pub since: Option<i64>,
    /// Exclusive upper bound, epoch ms
    #[serde(default)]
    pub until: Option<i64>,
    #[serde(default = "default_log_limit")]
    pub limit: u32,
}

fn default_log_limit() -> u32 {
    DEFAULT_LOG_LIMIT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsResponse {
    pub job_id: JobId,
    pub entries: Vec<LogEntry>,
}

/// schedule.sync.v1 - Reload one trigger, or all when `job_id` is absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub job_id: Option<JobId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub job_id: Option<JobId>,
    /// Whether the job (or full reload) ended up scheduled
    pub scheduled: bool,
    pub trigger_count: usize,
}

/// credential.check.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckCredentialRequest {
    pub credential_id: CredentialId,
}

/// admin.status.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub scheduled_jobs: usize,
    pub next_fire: Option<String>,
    pub queue_depth: usize,
    pub workers: usize,
    pub uptime_seconds: u64,
}
