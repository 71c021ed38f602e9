// Domain Layer - Pure business logic and entities

pub mod config;
pub mod credential;
pub mod cron;
pub mod error;
pub mod job;
pub mod log;
pub mod outcome;
pub mod task;

// Re-exports
pub use config::{DirectoryTransferConfig, JobConfig, QueryExportConfig};
pub use credential::{
    ConnectionTarget, Credential, CredentialId, CredentialKind, CredentialParams, EncryptMode,
    MssqlParams, SftpAuth, SftpParams,
};
pub use cron::CronSpec;
pub use error::DomainError;
pub use job::{Job, JobId, JobPayload, JobStatus, JobType, UserId};
pub use log::{LogEntry, LogStatus, NewLogEntry, TimeRange};
pub use outcome::{
    ConnectionFailure, ErrorKind, OutcomeStatus, RunError, RunOutcome, TransferredFile,
};
pub use task::{RunTrigger, TaskHandle, TASK_HISTORY_LIMIT};
