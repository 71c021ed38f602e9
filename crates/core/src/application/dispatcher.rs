// Run Dispatcher - records a handle, then enqueues the run for a worker

use crate::application::tracker::TaskTracker;
use crate::domain::{JobId, JobStatus, RunTrigger, TaskHandle};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

/// One queued run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub job_id: JobId,
    pub handle_id: String,
    pub trigger: RunTrigger,
}

/// Entry point for manual and scheduled triggers
#[async_trait]
pub trait RunSubmitter: Send + Sync {
    async fn submit(&self, job_id: JobId, trigger: RunTrigger) -> Result<TaskHandle>;
}

/// Bounded in-process run queue
pub fn run_queue(capacity: usize) -> (mpsc::Sender<RunRequest>, mpsc::Receiver<RunRequest>) {
    mpsc::channel(capacity.max(1))
}

pub struct RunDispatcher {
    tracker: Arc<TaskTracker>,
    queue: mpsc::Sender<RunRequest>,
}

impl RunDispatcher {
    pub fn new(tracker: Arc<TaskTracker>, queue: mpsc::Sender<RunRequest>) -> Self {
        Self { tracker, queue }
    }

    /// Runs waiting for a worker
    pub fn queue_depth(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    async fn reject(&self, job_id: JobId, handle: &TaskHandle, err: AppError) -> AppError {
        if let Err(e) = self
            .tracker
            .reconcile(job_id, &handle.id, JobStatus::Failure)
            .await
        {
            warn!(job_id, handle_id = %handle.id, error = %e, "Failed to reconcile rejected run");
        }
        err
    }
}

#[async_trait]
impl RunSubmitter for RunDispatcher {
    async fn submit(&self, job_id: JobId, trigger: RunTrigger) -> Result<TaskHandle> {
        let handle = self.tracker.submit(job_id, trigger).await?;
        let request = RunRequest {
            job_id,
            handle_id: handle.id.clone(),
            trigger,
        };

        match self.queue.try_send(request) {
            Ok(()) => {
                info!(job_id, handle_id = %handle.id, trigger = ?trigger, "Run submitted");
                Ok(handle)
            }
            Err(TrySendError::Full(_)) => Err(self
                .reject(job_id, &handle, AppError::Conflict("Run queue is full".to_string()))
                .await),
            Err(TrySendError::Closed(_)) => Err(self
                .reject(job_id, &handle, AppError::Internal("Run queue is closed".to_string()))
                .await),
        }
    }
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records submissions instead of queueing them
    #[derive(Default)]
    pub struct RecordingSubmitter {
        submitted: Mutex<Vec<(JobId, RunTrigger)>>,
    }

    impl RecordingSubmitter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn submitted(&self) -> Vec<(JobId, RunTrigger)> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RunSubmitter for RecordingSubmitter {
        async fn submit(&self, job_id: JobId, trigger: RunTrigger) -> Result<TaskHandle> {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push((job_id, trigger));
            Ok(TaskHandle::new(
                format!("recorded-{}", submitted.len()),
                0,
                trigger,
            ))
        }
    }
}
