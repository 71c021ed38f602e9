// Worker - run execution loop

pub mod constants;
mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::dispatcher::RunRequest;
use crate::application::engine::ExecutionEngine;
use crate::application::tracker::TaskTracker;
use crate::domain::RunOutcome;
use crate::error::Result;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn, Instrument};

/// Receiver shared by all workers of a pool
pub type SharedRunQueue = Arc<Mutex<mpsc::Receiver<RunRequest>>>;

/// Worker processes one run at a time from the shared queue
pub struct Worker {
    id: usize,
    queue: SharedRunQueue,
    engine: Arc<ExecutionEngine>,
    tracker: Arc<TaskTracker>,
    run_time_limit: Duration,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: SharedRunQueue,
        engine: Arc<ExecutionEngine>,
        tracker: Arc<TaskTracker>,
        run_time_limit: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            engine,
            tracker,
            run_time_limit,
        }
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// Shutdown is honoured between runs; a run in progress is finished first.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(worker = self.id, "Worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            let next = tokio::select! {
                request = async { self.queue.lock().await.recv().await } => request,
                _ = shutdown.wait() => {
                    info!(worker = self.id, "Worker interrupted while idle");
                    break;
                }
            };
            let Some(request) = next else {
                info!(worker = self.id, "Run queue closed");
                break;
            };
            self.process(request).await;
        }
        info!(worker = self.id, "Worker stopped");
        Ok(())
    }

    /// Execute one queued run and reconcile its handle
    pub async fn process(&self, request: RunRequest) -> RunOutcome {
        let span = tracing::info_span!(
            "run",
            worker = self.id,
            job_id = request.job_id,
            handle_id = %request.handle_id,
            trigger = ?request.trigger
        );
        let job_id = request.job_id;

        // Spawned so a panic inside the run cannot take the worker down
        let engine = Arc::clone(&self.engine);
        let mut handle: JoinHandle<RunOutcome> =
            tokio::spawn(async move { engine.run(job_id).await }.instrument(span.clone()));

        let outcome = match tokio::time::timeout(self.run_time_limit, &mut handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                let reason = if join_err.is_panic() {
                    format!("Run panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    "Run was cancelled".to_string()
                };
                error!(parent: &span, reason = %reason, "Run terminated abnormally");
                self.engine.abort_run(job_id, reason).await
            }
            Err(_) => {
                // Blocking transport calls already in flight finish on their own thread
                handle.abort();
                let reason = format!(
                    "Run exceeded time limit of {} seconds",
                    self.run_time_limit.as_secs()
                );
                error!(parent: &span, "Run time limit exceeded");
                self.engine.abort_run(job_id, reason).await
            }
        };

        let status = outcome.status.as_job_status();
        match self
            .tracker
            .reconcile(job_id, &request.handle_id, status)
            .await
        {
            Ok(true) => {}
            Ok(false) => info!(parent: &span, "Run handle no longer tracked"),
            Err(e) => warn!(parent: &span, error = %e, "Failed to reconcile run handle"),
        }
        outcome
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A fixed set of workers draining one run queue
pub struct WorkerPool {
    handles: Vec<JoinHandle<Result<()>>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        queue: mpsc::Receiver<RunRequest>,
        engine: Arc<ExecutionEngine>,
        tracker: Arc<TaskTracker>,
        run_time_limit: Duration,
        shutdown: &ShutdownSender,
    ) -> Self {
        let queue: SharedRunQueue = Arc::new(Mutex::new(queue));
        let handles = (0..count.max(1))
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&engine),
                    Arc::clone(&tracker),
                    run_time_limit,
                );
                let token = shutdown.token();
                tokio::spawn(async move { worker.run(token).await })
            })
            .collect();
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit
    pub async fn join(self) {
        for handle in self.handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Worker exited with error"),
                Err(e) => error!(error = %e, "Worker task panicked"),
            }
        }
    }
}
