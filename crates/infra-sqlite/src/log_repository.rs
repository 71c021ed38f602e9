// SQLite LogRepository Implementation (append-only)

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use courier_core::domain::{JobId, LogEntry, LogStatus, NewLogEntry, TimeRange};
use courier_core::error::Result;
use courier_core::port::LogRepository;
use sqlx::SqlitePool;
use std::str::FromStr;

pub struct SqliteLogRepository {
    pool: SqlitePool,
}

impl SqliteLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogRepository for SqliteLogRepository {
    async fn append(&self, entry: &NewLogEntry) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO logs (job_id, status, message, details, timestamp) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.job_id)
        .bind(entry.status.as_str())
        .bind(&entry.message)
        .bind(&entry.details)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_job(&self, job_id: JobId, range: TimeRange, limit: u32) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT id, job_id, status, message, details, timestamp
            FROM logs
            WHERE job_id = ?
              AND (? IS NULL OR timestamp >= ?)
              AND (? IS NULL OR timestamp < ?)
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(job_id)
        .bind(range.from)
        .bind(range.from)
        .bind(range.until)
        .bind(range.until)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(LogRow::into_entry).collect()
    }

    async fn find_in_range(&self, range: TimeRange) -> Result<Vec<LogEntry>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            r#"
            SELECT id, job_id, status, message, details, timestamp
            FROM logs
            WHERE (? IS NULL OR timestamp >= ?)
              AND (? IS NULL OR timestamp < ?)
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(range.from)
        .bind(range.from)
        .bind(range.until)
        .bind(range.until)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(LogRow::into_entry).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LogRow {
    id: i64,
    job_id: i64,
    status: String,
    message: String,
    details: Option<String>,
    timestamp: i64,
}

impl LogRow {
    fn into_entry(self) -> Result<LogEntry> {
        Ok(LogEntry {
            id: self.id,
            job_id: self.job_id,
            status: LogStatus::from_str(&self.status)?,
            message: self.message,
            details: self.details,
            timestamp: self.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn repo() -> SqliteLogRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteLogRepository::new(pool)
    }

    async fn append(repo: &SqliteLogRepository, job_id: JobId, status: LogStatus, at: i64) -> i64 {
        repo.append(&NewLogEntry::new(job_id, status, format!("at {}", at), at))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_find_by_job_newest_first_within_range() {
        let repo = repo().await;
        append(&repo, 1, LogStatus::Info, 100).await;
        append(&repo, 1, LogStatus::Success, 200).await;
        append(&repo, 1, LogStatus::Info, 300).await;
        append(&repo, 2, LogStatus::Failure, 250).await;

        let all = repo.find_by_job(1, TimeRange::default(), 50).await.unwrap();
        assert_eq!(
            all.iter().map(|e| e.timestamp).collect::<Vec<_>>(),
            vec![300, 200, 100]
        );

        // Half-open: 300 excluded
        let window = repo.find_by_job(1, TimeRange::between(100, 300), 50).await.unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].status, LogStatus::Success);

        let limited = repo.find_by_job(1, TimeRange::default(), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].timestamp, 300);
    }

    #[tokio::test]
    async fn test_details_round_trip_and_range_scan() {
        let repo = repo().await;
        let entry = NewLogEntry::new(3, LogStatus::Failure, "Upload failed", 10)
            .with_details(Some("caused by: Connection reset by peer".to_string()));
        repo.append(&entry).await.unwrap();
        append(&repo, 4, LogStatus::Info, 5).await;

        let found = repo
            .find_in_range(TimeRange {
                from: Some(0),
                until: None,
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].job_id, 4);
        assert_eq!(
            found[1].details.as_deref(),
            Some("caused by: Connection reset by peer")
        );
    }
}
