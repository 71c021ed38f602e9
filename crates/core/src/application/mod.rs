// Application Layer - Use Cases and Business Logic

pub mod connection_check;
pub mod dispatcher;
pub mod engine;
pub mod recovery;
pub mod report;
pub mod scheduler;
pub mod strategy;
pub mod tracker;
pub mod worker;

// Re-exports
pub use connection_check::{CheckResult, CredentialChecker};
pub use dispatcher::{run_queue, RunDispatcher, RunRequest, RunSubmitter};
pub use engine::ExecutionEngine;
pub use recovery::{RecoveryReport, RecoveryService};
pub use report::{DailyReport, DailyReportService, JobSummary};
pub use scheduler::{CronScheduler, TriggerKey};
pub use strategy::{RunContext, Strategies, StrategyOutput, TransferStrategy};
pub use tracker::TaskTracker;
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerPool};
