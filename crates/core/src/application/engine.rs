// Execution Engine - one job run from load to terminal status

use crate::application::strategy::{RunContext, Strategies, StrategyOutput};
use crate::domain::{
    Credential, CredentialId, DomainError, Job, JobId, JobStatus, LogStatus, NewLogEntry,
    RunError, RunOutcome, TransferredFile,
};
use crate::error::AppError;
use crate::port::{CredentialVault, JobRepository, LogRepository, TimeProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Runs jobs and records their status and log history
///
/// `run` never fails: every error is converted into a Failure outcome plus
/// a Failure log entry. Nothing is retried here; concurrent runs of the
/// same job are not serialized.
pub struct ExecutionEngine {
    jobs: Arc<dyn JobRepository>,
    logs: Arc<dyn LogRepository>,
    vault: Arc<dyn CredentialVault>,
    strategies: Strategies,
    time_provider: Arc<dyn TimeProvider>,
    staging_root: Option<PathBuf>,
}

impl ExecutionEngine {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        logs: Arc<dyn LogRepository>,
        vault: Arc<dyn CredentialVault>,
        strategies: Strategies,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            jobs,
            logs,
            vault,
            strategies,
            time_provider,
            staging_root: None,
        }
    }

    /// Create per-run staging directories under `root` instead of the system temp dir
    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    pub async fn run(&self, job_id: JobId) -> RunOutcome {
        let span = tracing::info_span!("run", job_id);
        self.run_inner(job_id).instrument(span).await
    }

    async fn run_inner(&self, job_id: JobId) -> RunOutcome {
        let mut job = match self.jobs.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(job_id, "Run requested for missing job");
                let err = RunError::Configuration(format!("Job {} not found", job_id));
                return RunOutcome::failure(job_id, &err, None, Vec::new());
            }
            // The row exists but its type tag maps to no strategy
            Err(AppError::Domain(DomainError::UnknownJobType(tag))) => {
                return self.fail_unloadable(job_id, RunError::UnknownJobType(tag)).await;
            }
            Err(e) => {
                error!(job_id, error = %e, "Failed to load job");
                let err = RunError::Storage(e.to_string());
                return RunOutcome::failure(job_id, &err, Some(err.diagnostic()), Vec::new());
            }
        };

        if !job.active {
            info!(job_id, "Job is inactive, skipping");
            return RunOutcome::skipped(job_id, format!("Job '{}' is inactive", job.name));
        }

        if let Err(e) = job.begin_run() {
            let err = RunError::from(e);
            return RunOutcome::failure(job_id, &err, None, Vec::new());
        }
        self.persist_status(&job, None).await;
        self.append_log(job_id, LogStatus::Info, format!("Job '{}' started", job.name), None)
            .await;
        info!(job_id, job_type = %job.job_type, "Job started");

        let mut ctx = match RunContext::new(self.staging_root.as_deref(), self.time_provider.now_millis()) {
            Ok(ctx) => ctx,
            Err(err) => return self.finish_failure(&mut job, err, Vec::new()).await,
        };

        match self.execute(&job, &mut ctx).await {
            Ok(output) => {
                let files = ctx.finish();
                self.finish_success(&mut job, output, files).await
            }
            Err(err) => {
                let files = ctx.finish();
                self.finish_failure(&mut job, err, files).await
            }
        }
    }

    /// Steps 5-6: resolve credentials, dispatch to the job type's strategy
    async fn execute(&self, job: &Job, ctx: &mut RunContext) -> Result<StrategyOutput, RunError> {
        let source = self.resolve_credential(job.source_credential_id, "Source").await?;
        let destination = self
            .resolve_credential(job.destination_credential_id, "Destination")
            .await?;

        self.strategies
            .for_type(job.job_type)
            .execute(job, &source, &destination, ctx)
            .await
    }

    async fn resolve_credential(&self, id: CredentialId, role: &str) -> Result<Credential, RunError> {
        match self.vault.decrypt(id).await {
            Ok(Some(credential)) => Ok(credential),
            Ok(None) => Err(RunError::Configuration(format!(
                "{} credential {} not found",
                role, id
            ))),
            Err(e) => Err(RunError::from(e)),
        }
    }

    async fn finish_success(
        &self,
        job: &mut Job,
        output: StrategyOutput,
        files: Vec<TransferredFile>,
    ) -> RunOutcome {
        let now = self.time_provider.now_millis();
        if let Err(e) = job.finish_run(JobStatus::Success, now) {
            error!(job_id = job.id, error = %e, "Invalid terminal transition");
        }
        self.persist_status(job, Some(now)).await;

        self.append_log(job.id, LogStatus::Success, output.message.clone(), output.details.clone())
            .await;
        if !files.is_empty() {
            let listing = files
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n");
            self.append_log(
                job.id,
                LogStatus::Info,
                format!("Files transferred: {}", files.len()),
                Some(listing),
            )
            .await;
        }
        for warning in &output.warnings {
            self.append_log(job.id, LogStatus::Warning, warning.clone(), None)
                .await;
        }

        info!(job_id = job.id, files = files.len(), message = %output.message, "Job succeeded");
        RunOutcome::success(job.id, output.message, output.details, files)
    }

    async fn finish_failure(
        &self,
        job: &mut Job,
        err: RunError,
        files: Vec<TransferredFile>,
    ) -> RunOutcome {
        let now = self.time_provider.now_millis();
        if let Err(e) = job.finish_run(JobStatus::Failure, now) {
            error!(job_id = job.id, error = %e, "Invalid terminal transition");
        }
        self.persist_status(job, Some(now)).await;

        let details = failure_details(job, &err, &files);
        self.append_log(job.id, LogStatus::Failure, err.user_message(), Some(details.clone()))
            .await;

        error!(
            job_id = job.id,
            kind = ?err.kind(),
            transferred = files.len(),
            error = %err,
            "Job failed"
        );
        RunOutcome::failure(job.id, &err, Some(details), files)
    }

    /// Record a Failure for a job that could not even be loaded
    async fn fail_unloadable(&self, job_id: JobId, err: RunError) -> RunOutcome {
        let now = self.time_provider.now_millis();
        if let Err(e) = self.jobs.update_status(job_id, JobStatus::Failure, Some(now)).await {
            error!(job_id, error = %e, "Failed to persist job status");
        }
        self.append_log(job_id, LogStatus::Failure, err.user_message(), Some(err.diagnostic()))
            .await;
        error!(job_id, error = %err, "Job failed before dispatch");
        RunOutcome::failure(job_id, &err, Some(err.diagnostic()), Vec::new())
    }

    /// Terminate a run from outside (time limit, panic) and record it as Failure
    pub async fn abort_run(&self, job_id: JobId, reason: impl Into<String>) -> RunOutcome {
        let err = RunError::Aborted(reason.into());
        self.fail_unloadable(job_id, err).await
    }

    async fn persist_status(&self, job: &Job, last_run: Option<i64>) {
        if let Err(e) = self
            .jobs
            .update_status(job.id, job.last_status, last_run)
            .await
        {
            error!(job_id = job.id, status = %job.last_status, error = %e, "Failed to persist job status");
        }
    }

    async fn append_log(
        &self,
        job_id: JobId,
        status: LogStatus,
        message: impl Into<String>,
        details: Option<String>,
    ) {
        let entry = NewLogEntry::new(job_id, status, message, self.time_provider.now_millis())
            .with_details(details);
        if let Err(e) = self.logs.append(&entry).await {
            error!(job_id, status = %status, error = %e, "Failed to write run log");
        }
    }
}

fn failure_details(job: &Job, err: &RunError, files: &[TransferredFile]) -> String {
    let mut details = format!(
        "{}\njob_id={} type={} source_credential={} destination_credential={}",
        err.diagnostic(),
        job.id,
        job.job_type,
        job.source_credential_id,
        job.destination_credential_id
    );
    if !files.is_empty() {
        details.push_str(&format!("\nTransferred before failure ({}):", files.len()));
        for file in files {
            details.push_str("\n  ");
            details.push_str(&file.to_string());
        }
    }
    details
}
