// Task Tracker - bounded history of submitted run handles per job

use crate::domain::task::push_bounded;
use crate::domain::{JobId, JobStatus, RunTrigger, TaskHandle};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TaskHistoryRepository, TimeProvider};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Owns every write to the task history
///
/// `submit` and `reconcile` are read-modify-write cycles on the same list, so
/// they run under one lock. Share a single tracker per history store.
pub struct TaskTracker {
    history: Arc<dyn TaskHistoryRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    write_lock: Mutex<()>,
}

impl TaskTracker {
    pub fn new(
        history: Arc<dyn TaskHistoryRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            history,
            id_provider,
            time_provider,
            write_lock: Mutex::new(()),
        }
    }

    /// Record a new Pending handle at the head of the job's history
    pub async fn submit(&self, job_id: JobId, trigger: RunTrigger) -> Result<TaskHandle> {
        let _guard = self.write_lock.lock().await;
        let mut handles = self
            .history
            .load(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))?;

        let handle = TaskHandle::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            trigger,
        );
        push_bounded(&mut handles, handle.clone());

        if !self.history.save(job_id, &handles).await? {
            return Err(AppError::NotFound(format!("job {}", job_id)));
        }
        debug!(job_id, handle_id = %handle.id, "Run handle recorded");
        Ok(handle)
    }

    /// Mirror a run's terminal status onto its handle
    ///
    /// Best effort: a job or handle that no longer exists is a silent no-op
    /// (returns false).
    pub async fn reconcile(&self, job_id: JobId, handle_id: &str, status: JobStatus) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(mut handles) = self.history.load(job_id).await? else {
            return Ok(false);
        };
        let Some(handle) = handles.iter_mut().find(|h| h.id == handle_id) else {
            return Ok(false);
        };
        handle.status = status;
        self.history.save(job_id, &handles).await
    }

    /// Handles of a job, newest first
    pub async fn history(&self, job_id: JobId) -> Result<Vec<TaskHandle>> {
        self.history
            .load(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {}", job_id)))
    }
}
