// Courier Infrastructure - SQLite Adapter
// Implements: JobRepository, LogRepository, TaskHistoryRepository, CredentialVault

mod cipher;
mod connection;
mod error;
mod job_repository;
mod log_repository;
mod migration;
mod task_history;
mod vault;

pub use cipher::{AesGcmCipher, KEY_LEN};
pub use connection::create_pool;
pub use job_repository::SqliteJobRepository;
pub use log_repository::SqliteLogRepository;
pub use migration::run_migrations;
pub use task_history::SqliteTaskHistory;
pub use vault::SqliteCredentialVault;

// Note: sqlx::Error conversion is handled by `error::map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
