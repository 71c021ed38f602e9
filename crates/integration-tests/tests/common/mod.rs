//! Shared fixture: SQLite stores plus in-memory remote endpoints
#![allow(dead_code)]

use courier_core::application::{ExecutionEngine, Strategies, TaskTracker};
use courier_core::domain::{CredentialId, CredentialKind, Job, JobId, JobPayload, JobType};
use courier_core::port::file_server::mocks::MemoryFileServer;
use courier_core::port::id_provider::mocks::SequentialIdProvider;
use courier_core::port::query_source::mocks::CannedQuerySource;
use courier_core::port::time_provider::mocks::FixedTimeProvider;
use courier_core::port::JobRepository;
use courier_infra_sqlite::{
    create_pool, run_migrations, AesGcmCipher, SqliteCredentialVault, SqliteJobRepository,
    SqliteLogRepository, SqliteTaskHistory,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

// 2023-11-14T22:13:20Z
pub const NOW: i64 = 1_700_000_000_000;

pub struct Stack {
    pub pool: SqlitePool,
    pub jobs: Arc<SqliteJobRepository>,
    pub logs: Arc<SqliteLogRepository>,
    pub history: Arc<SqliteTaskHistory>,
    pub server: MemoryFileServer,
    pub queries: Arc<CannedQuerySource>,
    pub clock: Arc<FixedTimeProvider>,
    pub staging: TempDir,
    pub engine: Arc<ExecutionEngine>,
    pub sftp_source: CredentialId,
    pub sftp_destination: CredentialId,
    pub mssql_source: CredentialId,
}

pub async fn stack(queries: CannedQuerySource) -> Stack {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let jobs = Arc::new(SqliteJobRepository::new(pool.clone()));
    let logs = Arc::new(SqliteLogRepository::new(pool.clone()));
    let history = Arc::new(SqliteTaskHistory::new(pool.clone()));
    let vault = Arc::new(SqliteCredentialVault::new(
        pool.clone(),
        Arc::new(AesGcmCipher::generate().unwrap()),
    ));

    let sftp_source = vault
        .store(
            "source",
            CredentialKind::Sftp,
            1,
            &json!({"host": "src.example.com", "username": "etl", "password": "s3cret"}),
        )
        .await
        .unwrap();
    let sftp_destination = vault
        .store(
            "destination",
            CredentialKind::Sftp,
            1,
            &json!({"host": "dst.example.com", "port": 2222, "username": "etl", "private_key": "KEY"}),
        )
        .await
        .unwrap();
    let mssql_source = vault
        .store(
            "warehouse",
            CredentialKind::Mssql,
            1,
            &json!({"server": "sql01", "database": "dw", "username": "report", "password": "pw"}),
        )
        .await
        .unwrap();

    let server = MemoryFileServer::new();
    let queries = Arc::new(queries);
    let clock = Arc::new(FixedTimeProvider::new(NOW));
    let staging = tempfile::tempdir().unwrap();
    let engine = Arc::new(
        ExecutionEngine::new(
            jobs.clone(),
            logs.clone(),
            vault,
            Strategies::new(Arc::new(server.clone()), queries.clone()),
            clock.clone(),
        )
        .with_staging_root(staging.path()),
    );

    Stack {
        pool,
        jobs,
        logs,
        history,
        server,
        queries,
        clock,
        staging,
        engine,
        sftp_source,
        sftp_destination,
        mssql_source,
    }
}

impl Stack {
    pub async fn insert_job(
        &self,
        job_type: JobType,
        config: Value,
        source: CredentialId,
        destination: CredentialId,
    ) -> JobId {
        let job = Job::new(
            0,
            NOW - 86_400_000,
            format!("{} job", job_type),
            job_type,
            JobPayload::new(config),
            1,
            source,
            destination,
        );
        self.jobs.insert(&job).await.unwrap()
    }

    pub async fn insert_directory_job(&self, config: Value) -> JobId {
        self.insert_job(
            JobType::DirectoryTransfer,
            config,
            self.sftp_source,
            self.sftp_destination,
        )
        .await
    }

    pub fn tracker(&self) -> Arc<TaskTracker> {
        Arc::new(TaskTracker::new(
            self.history.clone(),
            Arc::new(SequentialIdProvider::new()),
            self.clock.clone(),
        ))
    }

    pub fn staging_is_empty(&self) -> bool {
        std::fs::read_dir(self.staging.path()).unwrap().count() == 0
    }
}
