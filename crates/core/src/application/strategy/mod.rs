// Transfer Strategies - one per job type

pub mod csv;
pub mod directory;
pub mod glob;
pub mod query_export;
pub mod rename;

pub use directory::DirectoryTransfer;
pub use query_export::QueryExport;

use crate::domain::{Credential, Job, JobType, RunError, TransferredFile};
use crate::port::{FileServerConnector, FileServerSession, QuerySource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const STAGING_PREFIX: &str = "courier-run-";

/// Per-run scratch state owned by the engine
///
/// The staging directory is removed when the context is dropped, on every
/// exit path. `transferred` only ever holds uploads the destination
/// confirmed, so a failed run still reports exactly what landed.
pub struct RunContext {
    staging: TempDir,
    now: DateTime<Utc>,
    transferred: Vec<TransferredFile>,
}

impl RunContext {
    pub fn new(staging_root: Option<&Path>, now_millis: i64) -> Result<Self, RunError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let staging = match staging_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| {
                    RunError::staging(format!("creating staging root {}", root.display()), e)
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| RunError::staging("creating staging directory", e))?;

        let now = DateTime::<Utc>::from_timestamp_millis(now_millis).unwrap_or_default();
        Ok(Self {
            staging,
            now,
            transferred: Vec::new(),
        })
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }

    /// Run start time, used for rename tokens and age filters
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn record_transfer(&mut self, file: TransferredFile) {
        self.transferred.push(file);
    }

    pub fn transferred(&self) -> &[TransferredFile] {
        &self.transferred
    }

    /// Consume the context, deleting the staging directory
    pub fn finish(self) -> Vec<TransferredFile> {
        let RunContext {
            staging,
            transferred,
            ..
        } = self;
        if let Err(e) = staging.close() {
            tracing::warn!(error = %e, "Failed to remove staging directory");
        }
        transferred
    }
}

/// What a strategy reports on success
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyOutput {
    pub message: String,
    pub details: Option<String>,
    /// Non-fatal conditions, logged as Warning entries
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait TransferStrategy: Send + Sync {
    async fn execute(
        &self,
        job: &Job,
        source: &Credential,
        destination: &Credential,
        ctx: &mut RunContext,
    ) -> Result<StrategyOutput, RunError>;
}

/// The strategy bound to each job type
pub struct Strategies {
    directory: DirectoryTransfer,
    query_export: QueryExport,
}

impl Strategies {
    pub fn new(files: Arc<dyn FileServerConnector>, queries: Arc<dyn QuerySource>) -> Self {
        Self {
            directory: DirectoryTransfer::new(Arc::clone(&files)),
            query_export: QueryExport::new(queries, files),
        }
    }

    pub fn for_type(&self, job_type: JobType) -> &dyn TransferStrategy {
        match job_type {
            JobType::DirectoryTransfer => &self.directory,
            JobType::QueryExport => &self.query_export,
        }
    }
}

/// Make sure `dir` exists on the server, creating it when allowed
pub(crate) async fn ensure_remote_dir(
    session: &mut dyn FileServerSession,
    dir: &str,
    create: bool,
) -> Result<(), RunError> {
    match session.stat(dir).await? {
        Some(entry) if entry.is_dir => Ok(()),
        Some(_) => Err(RunError::Configuration(format!(
            "Destination path {} exists but is not a directory",
            dir
        ))),
        None if create => {
            tracing::info!(endpoint = %session.target(), dir, "Creating destination directory");
            session.create_dir_all(dir).await
        }
        None => Err(RunError::Configuration(format!(
            "Destination directory {} does not exist and create_directories is disabled",
            dir
        ))),
    }
}
