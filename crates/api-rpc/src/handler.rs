//! RPC Method Handlers

use crate::error::{invalid_params, throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CheckCredentialRequest, LogsRequest, LogsResponse, RunJobRequest, RunJobResponse,
    StatusResponse, SyncRequest, SyncResponse, TasksRequest, TasksResponse, MAX_LOG_LIMIT,
};
use courier_core::application::{
    CheckResult, CredentialChecker, CronScheduler, RunDispatcher, RunSubmitter, TaskTracker,
};
use courier_core::domain::{RunTrigger, TimeRange};
use courier_core::error::AppError;
use courier_core::port::LogRepository;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// Services the control surface talks to
pub struct RpcContext {
    pub dispatcher: Arc<RunDispatcher>,
    pub tracker: Arc<TaskTracker>,
    pub logs: Arc<dyn LogRepository>,
    pub scheduler: Arc<CronScheduler>,
    pub checker: Arc<CredentialChecker>,
    pub workers: usize,
}

pub struct RpcHandler {
    ctx: RpcContext,
    rate_limiter: RateLimiter,
    started: Instant,
}

impl RpcHandler {
    pub fn new(ctx: RpcContext, rate_limiter: RateLimiter) -> Self {
        Self {
            ctx,
            rate_limiter,
            started: Instant::now(),
        }
    }

    fn throttle(&self) -> RpcResult<()> {
        if self.rate_limiter.try_acquire() {
            Ok(())
        } else {
            Err(throttled())
        }
    }

    /// job.run.v1
    pub async fn run_job(&self, req: RunJobRequest) -> RpcResult<RunJobResponse> {
        self.throttle()?;

        let handle = self
            .ctx
            .dispatcher
            .submit(req.job_id, RunTrigger::Manual)
            .await
            .map_err(to_rpc_error)?;

        info!(job_id = req.job_id, handle_id = %handle.id, "Manual run requested");
        Ok(RunJobResponse {
            job_id: req.job_id,
            handle_id: handle.id,
            submitted_at: handle.submitted_at,
            status: handle.status,
            trigger: handle.trigger,
        })
    }

    /// job.tasks.v1
    pub async fn tasks(&self, req: TasksRequest) -> RpcResult<TasksResponse> {
        let tasks = self
            .ctx
            .tracker
            .history(req.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(TasksResponse {
            job_id: req.job_id,
            tasks,
        })
    }

    /// job.logs.v1
    pub async fn logs(&self, req: LogsRequest) -> RpcResult<LogsResponse> {
        if let (Some(since), Some(until)) = (req.since, req.until) {
            if since >= until {
                return Err(invalid_params("`since` must be earlier than `until`"));
            }
        }
        let range = TimeRange {
            from: req.since,
            until: req.until,
        };
        let limit = req.limit.clamp(1, MAX_LOG_LIMIT);

        let entries = self
            .ctx
            .logs
            .find_by_job(req.job_id, range, limit)
            .await
            .map_err(to_rpc_error)?;
        Ok(LogsResponse {
            job_id: req.job_id,
            entries,
        })
    }

    /// schedule.sync.v1
    pub async fn sync(&self, req: SyncRequest) -> RpcResult<SyncResponse> {
        self.throttle()?;

        let scheduled = match req.job_id {
            Some(job_id) => self
                .ctx
                .scheduler
                .update_schedule(job_id)
                .await
                .map_err(to_rpc_error)?,
            None => {
                if !self.ctx.scheduler.initialize().await {
                    return Err(to_rpc_error(AppError::Internal(
                        "Failed to load scheduled jobs".to_string(),
                    )));
                }
                true
            }
        };

        Ok(SyncResponse {
            job_id: req.job_id,
            scheduled,
            trigger_count: self.ctx.scheduler.trigger_count(),
        })
    }

    /// credential.check.v1
    pub async fn check_credential(&self, req: CheckCredentialRequest) -> RpcResult<CheckResult> {
        self.throttle()?;
        self.ctx
            .checker
            .check(req.credential_id)
            .await
            .map_err(to_rpc_error)
    }

    /// admin.status.v1
    pub async fn status(&self) -> RpcResult<StatusResponse> {
        Ok(StatusResponse {
            version: courier_core::VERSION.to_string(),
            scheduled_jobs: self.ctx.scheduler.trigger_count(),
            next_fire: self.ctx.scheduler.next_wake().map(|t| t.to_rfc3339()),
            queue_depth: self.ctx.dispatcher.queue_depth(),
            workers: self.ctx.workers,
            uptime_seconds: self.started.elapsed().as_secs(),
        })
    }
}
