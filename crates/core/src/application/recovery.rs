// Startup recovery
use crate::domain::{JobStatus, LogStatus, NewLogEntry};
use crate::error::Result;
use crate::port::{JobRepository, LogRepository, TaskHistoryRepository, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

pub const INTERRUPTED_MESSAGE: &str = "Run interrupted by daemon restart";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub interrupted_runs: usize,
    pub orphaned_handles: usize,
}

/// Repairs state left behind by a daemon that died mid-run
///
/// The run queue lives in memory, so after a restart nothing will ever
/// finish a job still marked RUNNING or a handle still marked PENDING.
/// Both are closed out as Failure.
pub struct RecoveryService {
    jobs: Arc<dyn JobRepository>,
    logs: Arc<dyn LogRepository>,
    history: Arc<dyn TaskHistoryRepository>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        logs: Arc<dyn LogRepository>,
        history: Arc<dyn TaskHistoryRepository>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            jobs,
            logs,
            history,
            time_provider,
        }
    }

    /// Must run before the scheduler and workers start
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let now = self.time_provider.now_millis();
        let mut report = RecoveryReport::default();

        for job in self.jobs.find_by_status(JobStatus::Running).await? {
            warn!(job_id = job.id, name = %job.name, "Recovering interrupted run");
            self.jobs
                .update_status(job.id, JobStatus::Failure, Some(now))
                .await?;
            self.logs
                .append(&NewLogEntry::new(
                    job.id,
                    LogStatus::Failure,
                    INTERRUPTED_MESSAGE,
                    now,
                ))
                .await?;
            report.interrupted_runs += 1;
        }

        for job in self.jobs.find_all().await? {
            let Some(mut handles) = self.history.load(job.id).await? else {
                continue;
            };
            let mut orphaned = 0;
            for handle in handles.iter_mut().filter(|h| h.status == JobStatus::Pending) {
                handle.status = JobStatus::Failure;
                orphaned += 1;
            }
            if orphaned > 0 {
                self.history.save(job.id, &handles).await?;
                report.orphaned_handles += orphaned;
            }
        }

        info!(
            interrupted_runs = report.interrupted_runs,
            orphaned_handles = report.orphaned_handles,
            "Startup recovery complete"
        );
        Ok(report)
    }
}
