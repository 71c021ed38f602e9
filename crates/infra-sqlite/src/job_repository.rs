// SQLite JobRepository Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use courier_core::domain::{Job, JobId, JobPayload, JobStatus, JobType};
use courier_core::error::{AppError, Result};
use courier_core::port::JobRepository;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::warn;

const JOB_COLUMNS: &str = "id, name, job_type, schedule, active, config, last_run, last_status, \
     user_id, source_credential_id, destination_credential_id, created_at";

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, status: Option<JobStatus>) -> Result<Vec<Job>> {
        let mut query = sqlx::query_as::<_, JobRow>(sql);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;

        // One undecodable row must not hide every other job
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                match row.into_job() {
                    Ok(job) => Some(job),
                    Err(e) => {
                        warn!(job_id = id, error = %e, "Skipping undecodable job row");
                        None
                    }
                }
            })
            .collect())
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn insert(&self, job: &Job) -> Result<JobId> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (
                name, job_type, schedule, active, config,
                last_run, last_status, user_id,
                source_credential_id, destination_credential_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.name)
        .bind(job.job_type.as_str())
        .bind(&job.schedule)
        .bind(job.active)
        .bind(job.config.as_value().to_string())
        .bind(job.last_run)
        .bind(job.last_status.as_str())
        .bind(job.user_id)
        .bind(job.source_credential_id)
        .bind(job.destination_credential_id)
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Job>> {
        self.fetch_many(
            &format!("SELECT {} FROM jobs ORDER BY id ASC", JOB_COLUMNS),
            None,
        )
        .await
    }

    async fn find_active_scheduled(&self) -> Result<Vec<Job>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM jobs \
                 WHERE active = 1 AND schedule IS NOT NULL AND TRIM(schedule) != '' \
                 ORDER BY id ASC",
                JOB_COLUMNS
            ),
            None,
        )
        .await
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        self.fetch_many(
            &format!(
                "SELECT {} FROM jobs WHERE last_status = ? ORDER BY id ASC",
                JOB_COLUMNS
            ),
            Some(status),
        )
        .await
    }

    async fn update_status(&self, id: JobId, status: JobStatus, last_run: Option<i64>) -> Result<()> {
        // Only the two run columns are written; job definitions are edited elsewhere
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET last_status = ?, last_run = COALESCE(?, last_run)
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(last_run)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("job {}", id)));
        }
        Ok(())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    name: String,
    job_type: String,
    schedule: Option<String>,
    active: bool,
    config: String,
    last_run: Option<i64>,
    last_status: String,
    user_id: i64,
    source_credential_id: i64,
    destination_credential_id: i64,
    created_at: i64,
}

impl JobRow {
    /// Unknown type tags surface as `DomainError::UnknownJobType`
    fn into_job(self) -> Result<Job> {
        let job_type = JobType::from_str(&self.job_type)?;
        let last_status = JobStatus::from_str(&self.last_status)?;
        let config: serde_json::Value = serde_json::from_str(&self.config)?;

        let mut job = Job::new(
            self.id,
            self.created_at,
            self.name,
            job_type,
            JobPayload::new(config),
            self.user_id,
            self.source_credential_id,
            self.destination_credential_id,
        );
        job.schedule = self.schedule;
        job.active = self.active;
        job.last_run = self.last_run;
        job.last_status = last_status;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use courier_core::domain::DomainError;
    use serde_json::json;

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn transfer_job() -> Job {
        Job::new_test(
            JobType::DirectoryTransfer,
            json!({"source_directory": "/in", "destination_directory": "/out", "file_pattern": "*.csv"}),
        )
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = SqliteJobRepository::new(setup_test_db().await);
        let job = transfer_job().with_schedule("0 2 * * *");

        let id = repo.insert(&job).await.unwrap();

        let found = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.name, job.name);
        assert_eq!(found.job_type, JobType::DirectoryTransfer);
        assert_eq!(found.schedule.as_deref(), Some("0 2 * * *"));
        assert_eq!(found.config.as_value()["file_pattern"], "*.csv");
        assert_eq!(found.last_status, JobStatus::Pending);
        assert!(repo.find_by_id(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_active_scheduled() {
        let repo = SqliteJobRepository::new(setup_test_db().await);
        let scheduled = repo.insert(&transfer_job().with_schedule("*/5 * * * *")).await.unwrap();
        repo.insert(&transfer_job().with_schedule("   ")).await.unwrap();
        repo.insert(&transfer_job()).await.unwrap();
        repo.insert(&transfer_job().with_schedule("0 * * * *").inactive())
            .await
            .unwrap();

        let found = repo.find_active_scheduled().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, scheduled);
    }

    #[tokio::test]
    async fn test_update_status_keeps_last_run_when_none() {
        let repo = SqliteJobRepository::new(setup_test_db().await);
        let id = repo.insert(&transfer_job()).await.unwrap();

        repo.update_status(id, JobStatus::Success, Some(1_000)).await.unwrap();
        repo.update_status(id, JobStatus::Running, None).await.unwrap();

        let job = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(job.last_status, JobStatus::Running);
        assert_eq!(job.last_run, Some(1_000));
        assert_eq!(repo.find_by_status(JobStatus::Running).await.unwrap().len(), 1);

        let err = repo.update_status(999, JobStatus::Failure, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_type_is_reported_not_hidden() {
        let pool = setup_test_db().await;
        let repo = SqliteJobRepository::new(pool.clone());
        let good = repo.insert(&transfer_job()).await.unwrap();
        let legacy = repo.insert(&transfer_job()).await.unwrap();
        sqlx::query("UPDATE jobs SET job_type = 'ftp_mirror' WHERE id = ?")
            .bind(legacy)
            .execute(&pool)
            .await
            .unwrap();

        let err = repo.find_by_id(legacy).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::UnknownJobType(ref t)) if t == "ftp_mirror"
        ));

        let all = repo.find_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, good);
    }
}
