// SQLite TaskHistoryRepository Implementation
//
// Handles live in the `task_ids` JSON column of the job row.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use courier_core::domain::{JobId, TaskHandle};
use courier_core::error::Result;
use courier_core::port::TaskHistoryRepository;
use sqlx::SqlitePool;
use tracing::warn;

pub struct SqliteTaskHistory {
    pool: SqlitePool,
}

impl SqliteTaskHistory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskHistoryRepository for SqliteTaskHistory {
    async fn load(&self, job_id: JobId) -> Result<Option<Vec<TaskHandle>>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT task_ids FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(raw.map(|raw| {
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(job_id, error = %e, "Discarding unreadable task history");
                Vec::new()
            })
        }))
    }

    async fn save(&self, job_id: JobId, handles: &[TaskHandle]) -> Result<bool> {
        let raw = serde_json::to_string(handles)?;
        let result = sqlx::query("UPDATE jobs SET task_ids = ? WHERE id = ?")
            .bind(raw)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteJobRepository};
    use courier_core::domain::{Job, JobStatus, JobType, RunTrigger};
    use courier_core::port::JobRepository;

    #[tokio::test]
    async fn test_save_and_load() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let jobs = SqliteJobRepository::new(pool.clone());
        let history = SqliteTaskHistory::new(pool);
        let id = jobs
            .insert(&Job::new_test(JobType::QueryExport, serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(history.load(id).await.unwrap(), Some(vec![]));

        let mut done = TaskHandle::new("run-1", 10, RunTrigger::Scheduled);
        done.status = JobStatus::Success;
        let handles = vec![TaskHandle::new("run-2", 20, RunTrigger::Manual), done];
        assert!(history.save(id, &handles).await.unwrap());
        assert_eq!(history.load(id).await.unwrap(), Some(handles));

        assert_eq!(history.load(id + 1).await.unwrap(), None);
        assert!(!history.save(id + 1, &[]).await.unwrap());
    }
}
