// Directory Transfer Strategy (file server -> file server)

use super::glob::FileGlob;
use super::rename::apply_rename;
use super::{ensure_remote_dir, RunContext, StrategyOutput, TransferStrategy};
use crate::domain::{
    Credential, DirectoryTransferConfig, Job, JobConfig, RunError, TransferredFile,
};
use crate::port::file_server::{join_remote, remote_base_name};
use crate::port::{FileServerConnector, FileServerSession};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SECONDS_PER_DAY: i64 = 86_400;

/// A remote file selected for transfer
#[derive(Debug, Clone)]
struct Candidate {
    remote_path: String,
    name: String,
    /// Sub-directory relative to the source root ("" at the top level)
    relative_dir: String,
    modified: Option<i64>,
}

/// A candidate downloaded into the staging area
#[derive(Debug)]
struct StagedFile {
    candidate: Candidate,
    local_path: PathBuf,
}

pub struct DirectoryTransfer {
    files: Arc<dyn FileServerConnector>,
}

impl DirectoryTransfer {
    pub fn new(files: Arc<dyn FileServerConnector>) -> Self {
        Self { files }
    }

    /// Steps 1-2: select matching files and stage them locally
    async fn stage_sources(
        &self,
        session: &mut dyn FileServerSession,
        config: &DirectoryTransferConfig,
        ctx: &RunContext,
    ) -> Result<Vec<StagedFile>, RunError> {
        let candidates = collect_candidates(session, config, ctx.now().timestamp()).await?;

        let mut staged = Vec::with_capacity(candidates.len());
        for (index, candidate) in candidates.into_iter().enumerate() {
            // Index prefix keeps same-named files from different sub-directories apart
            let local_path = ctx
                .staging_dir()
                .join(format!("{:05}_{}", index, candidate.name));
            let bytes = session.download(&candidate.remote_path, &local_path).await?;
            debug!(remote = %candidate.remote_path, bytes, "Staged source file");
            staged.push(StagedFile {
                candidate,
                local_path,
            });
        }
        Ok(staged)
    }
}

/// Walk the source path and apply pattern, age and count filters
async fn collect_candidates(
    session: &mut dyn FileServerSession,
    config: &DirectoryTransferConfig,
    now_secs: i64,
) -> Result<Vec<Candidate>, RunError> {
    let root = config.source_directory.trim();
    let entry = session.stat(root).await?.ok_or_else(|| {
        RunError::Configuration(format!("Source path {} does not exist", root))
    })?;

    let glob = FileGlob::new(&config.file_pattern)?;
    let mut found = Vec::new();
    if !entry.is_dir {
        let name = remote_base_name(&entry.path).to_string();
        if glob.matches(&name) {
            found.push(Candidate {
                remote_path: entry.path.clone(),
                name,
                relative_dir: String::new(),
                modified: entry.modified,
            });
        }
    } else {
        let mut pending = vec![(root.to_string(), String::new())];
        while let Some((dir, relative_dir)) = pending.pop() {
            for entry in session.list_dir(&dir).await? {
                if entry.is_dir {
                    if config.recursive {
                        pending.push((entry.path.clone(), join_remote(&relative_dir, &entry.name)));
                    }
                } else if glob.matches(&entry.name) {
                    found.push(Candidate {
                        remote_path: entry.path,
                        name: entry.name,
                        relative_dir: relative_dir.clone(),
                        modified: entry.modified,
                    });
                }
            }
        }
    }

    if config.max_file_age_days > 0 {
        let cutoff = now_secs - i64::from(config.max_file_age_days) * SECONDS_PER_DAY;
        found.retain(|c| c.modified.map_or(true, |m| m >= cutoff));
    }

    found.sort_by(|a, b| {
        (a.relative_dir.as_str(), a.name.as_str()).cmp(&(b.relative_dir.as_str(), b.name.as_str()))
    });
    if config.max_files_per_run > 0 {
        found.truncate(config.max_files_per_run as usize);
    }
    Ok(found)
}

fn no_files_details(config: &DirectoryTransferConfig) -> String {
    format!(
        "Path: {}, Pattern: {}",
        config.source_directory, config.file_pattern
    )
}

#[async_trait]
impl TransferStrategy for DirectoryTransfer {
    async fn execute(
        &self,
        job: &Job,
        source: &Credential,
        destination: &Credential,
        ctx: &mut RunContext,
    ) -> Result<StrategyOutput, RunError> {
        let config = match JobConfig::parse(job.job_type, &job.config)? {
            JobConfig::DirectoryTransfer(config) => config,
            JobConfig::QueryExport(_) => {
                return Err(RunError::Configuration(
                    "Directory transfer requires a directory transfer config".to_string(),
                ))
            }
        };
        let source_params = source.sftp()?;
        let destination_params = destination.sftp()?;

        let staged = {
            let mut session = self.files.connect(source_params).await?;
            self.stage_sources(session.as_mut(), &config, ctx).await?
        };

        if staged.is_empty() {
            if config.fail_on_empty {
                return Err(RunError::EmptyResult(format!(
                    "No files found matching the pattern ({})",
                    no_files_details(&config)
                )));
            }
            info!(job_id = job.id, "No files found matching the pattern");
            return Ok(StrategyOutput {
                message: "No files found matching the pattern".to_string(),
                details: Some(no_files_details(&config)),
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();
        let mut moved_sources = Vec::new();
        {
            let mut session = self.files.connect(destination_params).await?;
            let root = config.destination_directory.trim();
            ensure_remote_dir(session.as_mut(), root, config.create_directories).await?;

            for file in &staged {
                let candidate = &file.candidate;
                let final_name = apply_rename(&config.file_rename_pattern, &candidate.name, &ctx.now());

                let remote_dir = if candidate.relative_dir.is_empty() {
                    root.to_string()
                } else {
                    let dir = join_remote(root, &candidate.relative_dir);
                    ensure_remote_dir(session.as_mut(), &dir, config.create_directories).await?;
                    dir
                };
                let remote_path = join_remote(&remote_dir, &final_name);

                if !config.overwrite_existing && session.stat(&remote_path).await?.is_some() {
                    warn!(job_id = job.id, remote = %remote_path, "Destination file exists, skipping");
                    warnings.push(format!(
                        "Skipped {}: {} already exists on the destination",
                        candidate.name, remote_path
                    ));
                    continue;
                }

                let size_bytes = session.upload(&file.local_path, &remote_path).await?;
                ctx.record_transfer(TransferredFile {
                    name: candidate.name.clone(),
                    final_name,
                    size_bytes,
                });
                moved_sources.push(candidate.remote_path.clone());

                if config.preserve_timestamps {
                    if let Some(modified) = candidate.modified {
                        if let Err(e) = session.set_modified(&remote_path, modified).await {
                            warnings.push(format!(
                                "Could not preserve timestamp of {}: {}",
                                remote_path, e
                            ));
                        }
                    }
                }
            }
        }

        if config.delete_after_download && !moved_sources.is_empty() {
            let mut session = self.files.connect(source_params).await?;
            for path in &moved_sources {
                session.remove_file(path).await?;
            }
            info!(job_id = job.id, deleted = moved_sources.len(), "Deleted transferred source files");
        }

        let details = ctx
            .transferred()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(StrategyOutput {
            message: format!("Successfully transferred {} files", ctx.transferred().len()),
            details: Some(details),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CredentialKind, JobType};
    use crate::port::credential_vault::mocks::MemoryVault;
    use crate::port::file_server::mocks::MemoryFileServer;
    use crate::port::CredentialVault;
    use serde_json::{json, Value};

    // 2024-03-09T00:00:00Z
    const NOW_MS: i64 = 1_709_942_400_000;
    const NOW_SECS: i64 = NOW_MS / 1000;

    async fn sftp(id: i64) -> Credential {
        MemoryVault::new()
            .with(
                id,
                CredentialKind::Sftp,
                json!({"host": "files", "username": "etl", "password": "pw"}),
            )
            .decrypt(id)
            .await
            .unwrap()
            .unwrap()
    }

    async fn run(server: &MemoryFileServer, config: Value) -> (Result<StrategyOutput, RunError>, Vec<TransferredFile>) {
        let job = Job::new_test(JobType::DirectoryTransfer, config);
        let strategy = DirectoryTransfer::new(Arc::new(server.clone()));
        let root = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::new(Some(root.path()), NOW_MS).unwrap();
        let result = strategy.execute(&job, &sftp(1).await, &sftp(2).await, &mut ctx).await;
        (result, ctx.finish())
    }

    #[tokio::test]
    async fn test_transfers_matching_files_only() {
        let server = MemoryFileServer::new();
        server.add_file("/in/a.csv", b"1,2", NOW_SECS);
        server.add_file("/in/b.csv", b"3,4", NOW_SECS);
        server.add_file("/in/notes.txt", b"x", NOW_SECS);

        let (result, files) = run(
            &server,
            json!({"source_directory": "/in", "destination_directory": "/out", "file_pattern": "*.csv"}),
        )
        .await;

        let output = result.unwrap();
        assert_eq!(output.message, "Successfully transferred 2 files");
        assert_eq!(files.len(), 2);
        assert!(server.exists("/out/a.csv") && server.exists("/out/b.csv"));
        assert!(!server.exists("/out/notes.txt"));
        assert_eq!(server.file("/out/a.csv").unwrap().modified, NOW_SECS);
    }

    #[tokio::test]
    async fn test_single_file_source() {
        let server = MemoryFileServer::new();
        server.add_file("/in/report.csv", b"r", NOW_SECS);

        let (result, files) = run(
            &server,
            json!({"source_directory": "/in/report.csv", "destination_directory": "/out", "file_pattern": "*.txt"}),
        )
        .await;
        assert_eq!(result.unwrap().message, "No files found matching the pattern");
        assert!(files.is_empty());

        let (result, files) = run(
            &server,
            json!({"source_directory": "/in/report.csv", "destination_directory": "/out"}),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_empty() {
        let server = MemoryFileServer::new();
        server.add_dir("/in");
        let (result, _) = run(
            &server,
            json!({"source_directory": "/in", "destination_directory": "/out", "fail_on_empty": true}),
        )
        .await;
        assert!(matches!(result, Err(RunError::EmptyResult(_))));
    }

    #[tokio::test]
    async fn test_rename_and_delete_after_download() {
        let server = MemoryFileServer::new();
        server.add_file("/in/data.csv", b"abc", NOW_SECS);

        let (result, files) = run(
            &server,
            json!({
                "source_directory": "/in",
                "destination_directory": "/archive/2024",
                "file_rename_pattern": "{basename}_{date}{ext}",
                "delete_after_download": true
            }),
        )
        .await;

        result.unwrap();
        assert_eq!(files[0].final_name, "data_20240309.csv");
        assert_eq!(files[0].size_bytes, 3);
        assert!(server.exists("/archive/2024/data_20240309.csv"));
        assert!(!server.exists("/in/data.csv"));
    }

    #[tokio::test]
    async fn test_existing_destination_is_skipped_and_kept_on_source() {
        let server = MemoryFileServer::new();
        server.add_file("/in/a.csv", b"new", NOW_SECS);
        server.add_file("/in/b.csv", b"new", NOW_SECS);
        server.add_file("/out/a.csv", b"old", 1);

        let (result, files) = run(
            &server,
            json!({"source_directory": "/in", "destination_directory": "/out", "delete_after_download": true}),
        )
        .await;

        let output = result.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(server.file("/out/a.csv").unwrap().data, b"old");
        assert!(server.exists("/in/a.csv"));
        assert!(!server.exists("/in/b.csv"));
    }

    #[tokio::test]
    async fn test_missing_destination_without_create_directories() {
        let server = MemoryFileServer::new();
        server.add_file("/in/a.csv", b"x", NOW_SECS);
        let (result, _) = run(
            &server,
            json!({"source_directory": "/in", "destination_directory": "/out", "create_directories": false}),
        )
        .await;
        assert!(matches!(result, Err(RunError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_recursive_age_and_count_limits() {
        let server = MemoryFileServer::new();
        server.add_file("/in/a.csv", b"a", NOW_SECS);
        server.add_file("/in/old.csv", b"o", NOW_SECS - 10 * SECONDS_PER_DAY);
        server.add_file("/in/sub/b.csv", b"b", NOW_SECS);
        server.add_file("/in/sub/c.csv", b"c", NOW_SECS);

        let (result, files) = run(
            &server,
            json!({
                "source_directory": "/in",
                "destination_directory": "/out",
                "recursive": true,
                "max_file_age_days": 7,
                "max_files_per_run": 2
            }),
        )
        .await;

        result.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
        assert!(server.exists("/out/sub/b.csv"));
        assert!(!server.exists("/out/old.csv"));
    }

    #[tokio::test]
    async fn test_recursive_subdir_respects_create_directories() {
        let server = MemoryFileServer::new();
        server.add_file("/in/sub/b.csv", b"b", NOW_SECS);
        server.add_dir("/out");

        let (result, files) = run(
            &server,
            json!({
                "source_directory": "/in",
                "destination_directory": "/out",
                "recursive": true,
                "create_directories": false
            }),
        )
        .await;

        assert!(matches!(result, Err(RunError::Configuration(_))));
        assert!(files.is_empty());
        assert!(!server.exists("/out/sub"));
        assert!(server.exists("/in/sub/b.csv"));
    }

    #[tokio::test]
    async fn test_missing_source_is_configuration_error() {
        let server = MemoryFileServer::new();
        let (result, _) = run(
            &server,
            json!({"source_directory": "/nope", "destination_directory": "/out"}),
        )
        .await;
        assert!(matches!(result, Err(RunError::Configuration(_))));
    }
}
