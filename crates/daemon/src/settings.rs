//! Layered daemon configuration
//!
//! Built-in defaults, then an optional TOML file (`COURIER_CONFIG`, else
//! `./courier.toml` if present), then `COURIER__SECTION__KEY` variables.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use courier_api_rpc::RpcServerConfig;
use courier_core::application::worker::constants::{
    DEFAULT_QUEUE_CAPACITY, DEFAULT_RUN_TIME_LIMIT, DEFAULT_WORKER_COUNT,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_ENV: &str = "COURIER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "courier.toml";
const DEFAULT_DATABASE_URL: &str = "sqlite://~/.courier/courier.db";
const DEFAULT_SECRET_KEY_PATH: &str = "~/.courier/secret.key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Daily-rolling log files are written here when set
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub count: usize,
    pub queue_capacity: usize,
    pub run_time_limit_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            run_time_limit_secs: DEFAULT_RUN_TIME_LIMIT.as_secs(),
        }
    }
}

impl WorkerSettings {
    pub fn run_time_limit(&self) -> Duration {
        Duration::from_secs(self.run_time_limit_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub staging_dir: Option<String>,
    pub secret_key_path: String,
    pub known_hosts_path: Option<String>,
    pub rpc: RpcServerConfig,
    pub workers: WorkerSettings,
    pub log: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            staging_dir: None,
            secret_key_path: DEFAULT_SECRET_KEY_PATH.to_string(),
            known_hosts_path: None,
            rpc: RpcServerConfig::default(),
            workers: WorkerSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let explicit = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::build(explicit.as_deref(), env_source())
    }

    fn build(explicit: Option<&Path>, env: Environment) -> Result<Self> {
        let file = match explicit {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// `sqlite://` URL with `~` expanded
    pub fn database_url(&self) -> String {
        match self.database_url.strip_prefix("sqlite://") {
            Some(path) => format!("sqlite://{}", expand(path).display()),
            None => self.database_url.clone(),
        }
    }

    /// Directory holding the database file, when it is file-backed
    pub fn database_dir(&self) -> Option<PathBuf> {
        let url = self.database_url();
        let path = url.strip_prefix("sqlite://")?;
        if path.starts_with(":memory:") || path.is_empty() {
            return None;
        }
        let path = path.split('?').next().unwrap_or(path);
        Path::new(path).parent().map(Path::to_path_buf)
    }

    pub fn secret_key_path(&self) -> PathBuf {
        expand(&self.secret_key_path)
    }

    pub fn staging_dir(&self) -> Option<PathBuf> {
        self.staging_dir.as_deref().map(expand)
    }

    /// Configured path, else `~/.ssh/known_hosts`
    pub fn known_hosts_path(&self) -> Option<PathBuf> {
        match &self.known_hosts_path {
            Some(path) => Some(expand(path)),
            None => directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts")),
        }
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log.dir.as_deref().map(expand)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("COURIER")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env_source().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::build(None, env(&[])).unwrap();
        assert_eq!(settings.rpc.port, 9627);
        assert_eq!(settings.rpc.host, "127.0.0.1");
        assert_eq!(settings.workers.count, DEFAULT_WORKER_COUNT);
        assert_eq!(settings.workers.run_time_limit(), DEFAULT_RUN_TIME_LIMIT);
        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert!(!settings.database_url().contains('~'));
    }

    #[test]
    fn test_file_then_env_layering() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "database_url = \"sqlite:///var/lib/courier/courier.db\"\n\
             [workers]\ncount = 8\n\
             [log]\nformat = \"json\""
        )
        .unwrap();

        let settings = Settings::build(
            Some(file.path()),
            env(&[("COURIER__WORKERS__COUNT", "3"), ("COURIER__RPC__PORT", "9700")]),
        )
        .unwrap();

        assert_eq!(settings.workers.count, 3);
        assert_eq!(settings.rpc.port, 9700);
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(
            settings.database_dir(),
            Some(PathBuf::from("/var/lib/courier"))
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Settings::build(Some(Path::new("/nonexistent/courier.toml")), env(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_memory_database_has_no_dir() {
        let settings = Settings {
            database_url: "sqlite::memory:".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.database_dir(), None);
    }
}
