// Port Layer - Interfaces for external dependencies

pub mod credential_vault;
pub mod file_server;
pub mod id_provider; // For deterministic testing
pub mod job_repository;
pub mod log_repository;
pub mod query_source;
pub mod secret_cipher;
pub mod task_history;
pub mod time_provider;

// Re-exports
pub use credential_vault::CredentialVault;
pub use file_server::{FileServerConnector, FileServerSession, RemoteEntry};
pub use id_provider::IdProvider;
pub use job_repository::JobRepository;
pub use log_repository::LogRepository;
pub use query_source::{QueryResult, QuerySource};
pub use secret_cipher::SecretCipher;
pub use task_history::TaskHistoryRepository;
pub use time_provider::TimeProvider;
