// Task Handle Domain Model

use crate::domain::job::JobStatus;
use serde::{Deserialize, Serialize};

/// Handles kept per job, newest first
pub const TASK_HISTORY_LIMIT: usize = 10;

/// What caused a run to be submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunTrigger {
    Manual,
    Scheduled,
}

/// Record of one asynchronously submitted run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    pub submitted_at: i64, // epoch ms
    pub status: JobStatus,
    #[serde(default = "default_trigger")]
    pub trigger: RunTrigger,
}

fn default_trigger() -> RunTrigger {
    RunTrigger::Manual
}

impl TaskHandle {
    pub fn new(id: impl Into<String>, submitted_at: i64, trigger: RunTrigger) -> Self {
        Self {
            id: id.into(),
            submitted_at,
            status: JobStatus::Pending,
            trigger,
        }
    }
}

/// Prepend `handle` and evict the oldest entries beyond the limit
pub fn push_bounded(history: &mut Vec<TaskHandle>, handle: TaskHandle) {
    history.insert(0, handle);
    history.truncate(TASK_HISTORY_LIMIT);
}
