// Run Log Domain Model (append-only)

use crate::domain::error::{DomainError, Result};
use crate::domain::job::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Info,
    Success,
    Failure,
    Warning,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Info => "info",
            LogStatus::Success => "success",
            LogStatus::Failure => "failure",
            LogStatus::Warning => "warning",
        }
    }
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(LogStatus::Info),
            "success" => Ok(LogStatus::Success),
            "failure" => Ok(LogStatus::Failure),
            "warning" => Ok(LogStatus::Warning),
            other => Err(DomainError::ValidationError(format!(
                "Unknown log status: {}",
                other
            ))),
        }
    }
}

/// Log record before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub job_id: JobId,
    pub status: LogStatus,
    pub message: String,
    pub details: Option<String>,
    pub timestamp: i64, // epoch ms
}

impl NewLogEntry {
    pub fn new(job_id: JobId, status: LogStatus, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            job_id,
            status,
            message: message.into(),
            details: None,
            timestamp,
        }
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details.filter(|d| !d.is_empty());
        self
    }
}

/// Stored log record, immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub job_id: JobId,
    pub status: LogStatus,
    pub message: String,
    pub details: Option<String>,
    pub timestamp: i64,
}

/// Half-open time window `[from, until)` in epoch ms; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<i64>,
    pub until: Option<i64>,
}

impl TimeRange {
    pub fn between(from: i64, until: i64) -> Self {
        Self {
            from: Some(from),
            until: Some(until),
        }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.from.map_or(true, |f| timestamp >= f) && self.until.map_or(true, |u| timestamp < u)
    }
}
