// Task History Port (per-job list of run handles)

use crate::domain::{JobId, TaskHandle};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TaskHistoryRepository: Send + Sync {
    /// Handles of a job, newest first; `None` if the job does not exist
    async fn load(&self, job_id: JobId) -> Result<Option<Vec<TaskHandle>>>;

    /// Replace the handle list; returns false if the job no longer exists
    async fn save(&self, job_id: JobId, handles: &[TaskHandle]) -> Result<bool>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory history; a job "exists" once registered
    #[derive(Default)]
    pub struct MemoryTaskHistory {
        lists: Mutex<HashMap<JobId, Vec<TaskHandle>>>,
        yield_on_load: bool,
    }

    impl MemoryTaskHistory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_jobs(job_ids: impl IntoIterator<Item = JobId>) -> Self {
            let history = Self::new();
            for id in job_ids {
                history.register(id);
            }
            history
        }

        /// Yield to the runtime after every load, like a real store round-trip
        pub fn yielding(mut self) -> Self {
            self.yield_on_load = true;
            self
        }

        pub fn register(&self, job_id: JobId) {
            self.lists.lock().unwrap().entry(job_id).or_default();
        }

        pub fn forget(&self, job_id: JobId) {
            self.lists.lock().unwrap().remove(&job_id);
        }
    }

    #[async_trait]
    impl TaskHistoryRepository for MemoryTaskHistory {
        async fn load(&self, job_id: JobId) -> Result<Option<Vec<TaskHandle>>> {
            let list = self.lists.lock().unwrap().get(&job_id).cloned();
            if self.yield_on_load {
                tokio::task::yield_now().await;
            }
            Ok(list)
        }

        async fn save(&self, job_id: JobId, handles: &[TaskHandle]) -> Result<bool> {
            let mut lists = self.lists.lock().unwrap();
            match lists.get_mut(&job_id) {
                Some(list) => {
                    *list = handles.to_vec();
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }
}
