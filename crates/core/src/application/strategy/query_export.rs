// Query Export Strategy (relational source -> CSV file on a file server)

use super::csv::render_delimited;
use super::{ensure_remote_dir, RunContext, StrategyOutput, TransferStrategy};
use crate::domain::{Credential, Job, JobConfig, RunError, TransferredFile};
use crate::port::file_server::{join_remote, remote_base_name};
use crate::port::{FileServerConnector, QuerySource};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct QueryExport {
    queries: Arc<dyn QuerySource>,
    files: Arc<dyn FileServerConnector>,
}

impl QueryExport {
    pub fn new(queries: Arc<dyn QuerySource>, files: Arc<dyn FileServerConnector>) -> Self {
        Self { queries, files }
    }
}

#[async_trait]
impl TransferStrategy for QueryExport {
    async fn execute(
        &self,
        job: &Job,
        source: &Credential,
        destination: &Credential,
        ctx: &mut RunContext,
    ) -> Result<StrategyOutput, RunError> {
        let config = match JobConfig::parse(job.job_type, &job.config)? {
            JobConfig::QueryExport(config) => config,
            JobConfig::DirectoryTransfer(_) => {
                return Err(RunError::Configuration(
                    "Query export requires a query export config".to_string(),
                ))
            }
        };
        let delimiter = config.delimiter()?;
        let source_params = source.mssql()?;
        let destination_params = destination.sftp()?;

        let result = self
            .queries
            .fetch_all(source_params, &config.sql_query)
            .await?;
        // Unlike an empty directory, an empty result set fails the run
        if result.is_empty() {
            return Err(RunError::EmptyResult(
                "SQL query returned no results".to_string(),
            ));
        }
        info!(
            job_id = job.id,
            rows = result.rows.len(),
            columns = result.columns.len(),
            "Query materialized"
        );

        let output_file = config.output_file_name();
        let local_path = ctx.staging_dir().join(remote_base_name(&output_file));
        let rendered = render_delimited(&result, delimiter, config.include_headers);
        tokio::fs::write(&local_path, rendered.as_bytes())
            .await
            .map_err(|e| RunError::staging(format!("writing {}", local_path.display()), e))?;

        let destination_dir = config.destination_path.trim();
        let remote_path = join_remote(destination_dir, &output_file);
        let size_bytes = {
            let mut session = self.files.connect(destination_params).await?;
            ensure_remote_dir(session.as_mut(), destination_dir, true).await?;
            session.upload(&local_path, &remote_path).await?
        };
        ctx.record_transfer(TransferredFile {
            name: output_file.clone(),
            final_name: output_file.clone(),
            size_bytes,
        });

        Ok(StrategyOutput {
            message: "Successfully exported SQL query to CSV and uploaded to SFTP".to_string(),
            details: Some(format!(
                "File: {}, Destination: {}, Rows: {}",
                output_file,
                remote_path,
                result.rows.len()
            )),
            warnings: Vec::new(),
        })
    }
}
