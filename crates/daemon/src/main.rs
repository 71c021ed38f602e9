//! Courier Daemon - Main Entry Point
//!
//! Composition root: configuration, logging, stores, remote adapters,
//! startup recovery, scheduler, worker pool and the JSON-RPC control surface.

mod logging;
mod settings;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use courier_api_rpc::{RpcContext, RpcServer};
use courier_core::application::{
    run_queue, shutdown_channel, CredentialChecker, CronScheduler, DailyReportService,
    ExecutionEngine, RecoveryService, RunDispatcher, Strategies, TaskTracker, WorkerPool,
};
use courier_core::port::id_provider::UuidProvider;
use courier_core::port::time_provider::SystemTimeProvider;
use courier_infra_remote::{MssqlSource, SftpConnector};
use courier_infra_sqlite::{
    create_pool, run_migrations, AesGcmCipher, SqliteCredentialVault, SqliteJobRepository,
    SqliteLogRepository, SqliteTaskHistory,
};
use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long in-flight runs get to finish after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration, then logging
    let settings = Settings::load()?;
    let log_dir = settings.log_dir();
    if let Some(dir) = &log_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    let _log_guard = logging::init(&settings.log, log_dir.as_deref());

    info!(version = VERSION, "Courier daemon starting");

    // 2. Database
    if let Some(dir) = settings.database_dir() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }
    let database_url = settings.database_url();
    info!(database = %database_url, "Opening database");
    let pool = create_pool(&database_url)
        .await
        .context("DB pool creation failed")?;
    let schema_version = run_migrations(&pool).await.context("Migration failed")?;
    info!(schema_version, "Database ready");

    // 3. Wiring
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let jobs = Arc::new(SqliteJobRepository::new(pool.clone()));
    let logs = Arc::new(SqliteLogRepository::new(pool.clone()));
    let history = Arc::new(SqliteTaskHistory::new(pool.clone()));

    let key_path = settings.secret_key_path();
    let cipher = Arc::new(
        AesGcmCipher::load_or_create(&key_path)
            .with_context(|| format!("Failed to load secret key {}", key_path.display()))?,
    );
    let vault = Arc::new(SqliteCredentialVault::new(pool.clone(), cipher));

    let known_hosts = settings.known_hosts_path();
    if let Some(path) = known_hosts.as_ref().filter(|p| !p.exists()) {
        warn!(path = %path.display(), "known_hosts file not found; host key checks will fail");
    }
    let files = Arc::new(SftpConnector::new(known_hosts));
    let queries = Arc::new(MssqlSource::new());

    let mut engine = ExecutionEngine::new(
        jobs.clone(),
        logs.clone(),
        vault.clone(),
        Strategies::new(files.clone(), queries.clone()),
        time_provider.clone(),
    );
    if let Some(staging) = settings.staging_dir() {
        engine = engine.with_staging_root(staging);
    }
    let engine = Arc::new(engine);

    // 4. Startup recovery (before anything can start a run)
    let recovery = RecoveryService::new(
        jobs.clone(),
        logs.clone(),
        history.clone(),
        time_provider.clone(),
    );
    if let Err(e) = recovery.recover().await {
        error!(error = %e, "Startup recovery failed");
    }

    // 5. Run queue, workers, scheduler
    let tracker = Arc::new(TaskTracker::new(history, id_provider, time_provider.clone()));
    let (queue_tx, queue_rx) = run_queue(settings.workers.queue_capacity);
    let dispatcher = Arc::new(RunDispatcher::new(tracker.clone(), queue_tx));
    let (shutdown_tx, shutdown_token) = shutdown_channel();

    let workers = WorkerPool::spawn(
        settings.workers.count,
        queue_rx,
        engine,
        tracker.clone(),
        settings.workers.run_time_limit(),
        &shutdown_tx,
    );
    info!(
        workers = workers.size(),
        run_time_limit_secs = settings.workers.run_time_limit_secs,
        "Worker pool started"
    );

    let report = Arc::new(DailyReportService::new(jobs.clone(), logs.clone()));
    let scheduler = Arc::new(
        CronScheduler::new(jobs, dispatcher.clone(), time_provider).with_daily_report(report),
    );
    if !scheduler.initialize().await {
        warn!("Scheduler started without job triggers; use schedule sync to retry");
    }
    let scheduler_task = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_token).await })
    };

    // 6. Control surface
    let checker = Arc::new(CredentialChecker::new(vault, files, queries));
    let rpc = RpcServer::new(
        settings.rpc.clone(),
        RpcContext {
            dispatcher,
            tracker,
            logs,
            scheduler,
            checker,
            workers: workers.size(),
        },
    );
    let (rpc_handle, rpc_addr) = rpc.start().await.context("RPC server start failed")?;

    info!(rpc = %rpc_addr, "Courier daemon ready");

    // 7. Wait for shutdown signal
    wait_for_signal().await?;
    info!("Shutdown signal received");

    // 8. Graceful shutdown: stop accepting work, then let running jobs finish
    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Scheduler task panicked");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, workers.join()).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Workers still busy; interrupted runs are recovered on next start"
        );
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl+C"),
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")
}
