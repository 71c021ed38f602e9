// Typed job configuration, one schema per job type

use crate::domain::error::{DomainError, Result};
use crate::domain::job::{JobPayload, JobType};
use serde::{Deserialize, Serialize};

fn default_pattern() -> String {
    "*".to_string()
}

fn default_true() -> bool {
    true
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Directory Transfer options
///
/// Zero for `max_file_age_days` / `max_files_per_run` means "no limit".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryTransferConfig {
    #[serde(alias = "source_path")]
    pub source_directory: String,
    #[serde(alias = "destination_path")]
    pub destination_directory: String,
    #[serde(default = "default_pattern")]
    pub file_pattern: String,
    #[serde(default)]
    pub file_rename_pattern: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default = "default_true")]
    pub create_directories: bool,
    #[serde(default)]
    pub overwrite_existing: bool,
    #[serde(default, alias = "delete_after_transfer")]
    pub delete_after_download: bool,
    #[serde(default)]
    pub max_file_age_days: u32,
    #[serde(default)]
    pub max_files_per_run: u32,
    #[serde(default)]
    pub fail_on_empty: bool,
    #[serde(default = "default_true")]
    pub preserve_timestamps: bool,
}

/// Query Export options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryExportConfig {
    pub sql_query: String,
    pub output_file: String,
    pub destination_path: String,
    #[serde(default = "default_delimiter")]
    pub csv_delimiter: String,
    #[serde(default = "default_true")]
    pub include_headers: bool,
}

impl QueryExportConfig {
    /// Output name with a `.csv` extension enforced
    pub fn output_file_name(&self) -> String {
        let name = self.output_file.trim();
        if name.to_ascii_lowercase().ends_with(".csv") {
            name.to_string()
        } else {
            format!("{}.csv", name)
        }
    }

    /// Delimiter as a single character
    pub fn delimiter(&self) -> Result<char> {
        let mut chars = self.csv_delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c != '"' && c != '\n' && c != '\r' => Ok(c),
            _ => Err(DomainError::Configuration(format!(
                "csv_delimiter must be a single character, got {:?}",
                self.csv_delimiter
            ))),
        }
    }
}

/// Config parsed against the schema of the job's declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobConfig {
    DirectoryTransfer(DirectoryTransferConfig),
    QueryExport(QueryExportConfig),
}

impl JobConfig {
    pub fn parse(job_type: JobType, payload: &JobPayload) -> Result<Self> {
        let value = payload.as_value().clone();
        let parsed = match job_type {
            JobType::DirectoryTransfer => serde_json::from_value(value).map(JobConfig::DirectoryTransfer),
            JobType::QueryExport => serde_json::from_value(value).map(JobConfig::QueryExport),
        };
        let config = parsed.map_err(|e| {
            DomainError::Configuration(format!("Invalid {} config: {}", job_type, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_payload(&self) -> Result<JobPayload> {
        serde_json::to_value(self)
            .map(JobPayload::new)
            .map_err(|e| DomainError::ValidationError(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        match self {
            JobConfig::DirectoryTransfer(c) => {
                require_non_blank("source_directory", &c.source_directory)?;
                require_non_blank("destination_directory", &c.destination_directory)
            }
            JobConfig::QueryExport(c) => {
                require_non_blank("sql_query", &c.sql_query)?;
                require_non_blank("output_file", &c.output_file)?;
                require_non_blank("destination_path", &c.destination_path)?;
                c.delimiter().map(|_| ())
            }
        }
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::Configuration(format!("'{}' must not be empty", field)));
    }
    Ok(())
}
