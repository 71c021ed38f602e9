// Job Repository Port (Interface)

use crate::domain::{Job, JobId, JobStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Job persistence
///
/// Jobs are created and edited elsewhere; the engine only reads them and
/// writes `last_status` / `last_run`.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job, returning its store-assigned ID
    async fn insert(&self, job: &Job) -> Result<JobId>;

    /// Find job by ID
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>>;

    /// All jobs (recovery, reporting)
    async fn find_all(&self) -> Result<Vec<Job>>;

    /// Active jobs with a non-empty schedule
    async fn find_active_scheduled(&self) -> Result<Vec<Job>>;

    /// Find all jobs by last status
    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;

    /// Persist run status; `last_run` is left untouched when `None`
    async fn update_status(&self, id: JobId, status: JobStatus, last_run: Option<i64>) -> Result<()>;
}

pub mod mocks {
    use super::*;
    use crate::domain::DomainError;
    use crate::error::AppError;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory job store
    #[derive(Default)]
    pub struct MemoryJobRepository {
        jobs: Mutex<BTreeMap<JobId, Job>>,
        unknown_types: Mutex<HashSet<JobId>>,
        status_writes: Mutex<Vec<(JobId, JobStatus, Option<i64>)>>,
        unavailable: AtomicBool,
    }

    impl MemoryJobRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
            let repo = Self::new();
            for job in jobs {
                repo.put(job);
            }
            repo
        }

        /// Insert or replace a job keeping its ID
        pub fn put(&self, job: Job) {
            self.jobs.lock().unwrap().insert(job.id, job);
        }

        pub fn remove(&self, id: JobId) {
            self.jobs.lock().unwrap().remove(&id);
        }

        /// Make `id` decode as a job with an unrecognized type tag
        pub fn corrupt_type(&self, id: JobId) {
            self.unknown_types.lock().unwrap().insert(id);
        }

        pub fn get(&self, id: JobId) -> Option<Job> {
            self.jobs.lock().unwrap().get(&id).cloned()
        }

        /// Make scheduled-job lookups fail as if the store were down
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        /// Every `update_status` call, in order
        pub fn status_writes(&self) -> Vec<(JobId, JobStatus, Option<i64>)> {
            self.status_writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobRepository for MemoryJobRepository {
        async fn insert(&self, job: &Job) -> Result<JobId> {
            let mut jobs = self.jobs.lock().unwrap();
            let id = jobs.keys().next_back().copied().unwrap_or(0) + 1;
            let mut job = job.clone();
            job.id = id;
            jobs.insert(id, job);
            Ok(id)
        }

        async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
            if self.unknown_types.lock().unwrap().contains(&id) {
                return Err(AppError::Domain(DomainError::UnknownJobType(
                    "legacy_ftp".to_string(),
                )));
            }
            Ok(self.get(id))
        }

        async fn find_all(&self) -> Result<Vec<Job>> {
            Ok(self.jobs.lock().unwrap().values().cloned().collect())
        }

        async fn find_active_scheduled(&self) -> Result<Vec<Job>> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::Storage("job store unavailable".to_string()));
            }
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.is_schedulable())
                .cloned()
                .collect())
        }

        async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.last_status == status)
                .cloned()
                .collect())
        }

        async fn update_status(
            &self,
            id: JobId,
            status: JobStatus,
            last_run: Option<i64>,
        ) -> Result<()> {
            self.status_writes.lock().unwrap().push((id, status, last_run));
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| AppError::NotFound(format!("job {}", id)))?;
            job.last_status = status;
            if last_run.is_some() {
                job.last_run = last_run;
            }
            Ok(())
        }
    }
}
