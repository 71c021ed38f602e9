// Log Repository Port (append-only run log)

use crate::domain::{JobId, LogEntry, NewLogEntry, TimeRange};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait LogRepository: Send + Sync {
    /// Append a record, returning its ID
    async fn append(&self, entry: &NewLogEntry) -> Result<i64>;

    /// Records of one job within `range`, newest first
    async fn find_by_job(&self, job_id: JobId, range: TimeRange, limit: u32) -> Result<Vec<LogEntry>>;

    /// Records of all jobs within `range`, oldest first
    async fn find_in_range(&self, range: TimeRange) -> Result<Vec<LogEntry>>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryLogRepository {
        entries: Mutex<Vec<LogEntry>>,
    }

    impl MemoryLogRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn entries(&self) -> Vec<LogEntry> {
            self.entries.lock().unwrap().clone()
        }

        pub fn entries_for(&self, job_id: JobId) -> Vec<LogEntry> {
            self.entries()
                .into_iter()
                .filter(|e| e.job_id == job_id)
                .collect()
        }
    }

    #[async_trait]
    impl LogRepository for MemoryLogRepository {
        async fn append(&self, entry: &NewLogEntry) -> Result<i64> {
            let mut entries = self.entries.lock().unwrap();
            let id = entries.len() as i64 + 1;
            entries.push(LogEntry {
                id,
                job_id: entry.job_id,
                status: entry.status,
                message: entry.message.clone(),
                details: entry.details.clone(),
                timestamp: entry.timestamp,
            });
            Ok(id)
        }

        async fn find_by_job(
            &self,
            job_id: JobId,
            range: TimeRange,
            limit: u32,
        ) -> Result<Vec<LogEntry>> {
            let mut found: Vec<LogEntry> = self
                .entries()
                .into_iter()
                .filter(|e| e.job_id == job_id && range.contains(e.timestamp))
                .collect();
            found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
            found.truncate(limit as usize);
            Ok(found)
        }

        async fn find_in_range(&self, range: TimeRange) -> Result<Vec<LogEntry>> {
            let mut found: Vec<LogEntry> = self
                .entries()
                .into_iter()
                .filter(|e| range.contains(e.timestamp))
                .collect();
            found.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
            Ok(found)
        }
    }
}
