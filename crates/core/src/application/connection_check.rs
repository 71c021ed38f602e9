// Connection Check - try a stored credential against its server

use crate::domain::{CredentialId, CredentialParams, RunError};
use crate::error::{AppError, Result};
use crate::port::{CredentialVault, FileServerConnector, QuerySource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub ok: bool,
    pub message: String,
}

pub struct CredentialChecker {
    vault: Arc<dyn CredentialVault>,
    files: Arc<dyn FileServerConnector>,
    queries: Arc<dyn QuerySource>,
}

impl CredentialChecker {
    pub fn new(
        vault: Arc<dyn CredentialVault>,
        files: Arc<dyn FileServerConnector>,
        queries: Arc<dyn QuerySource>,
    ) -> Self {
        Self {
            vault,
            files,
            queries,
        }
    }

    /// Connect with the credential and report a user-facing result
    ///
    /// Only a missing credential or a store failure is an `Err`; connection
    /// problems come back as `ok: false` with an explanation.
    pub async fn check(&self, id: CredentialId) -> Result<CheckResult> {
        let credential = self
            .vault
            .decrypt(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("credential {}", id)))?;
        let target = credential.target();

        let attempt = match &credential.params {
            CredentialParams::Sftp(params) => self.check_sftp(params).await,
            CredentialParams::Mssql(params) => self
                .queries
                .ping(params)
                .await
                .map(|version| first_line(&version).to_string()),
        };

        Ok(match attempt {
            Ok(detail) => {
                info!(credential_id = id, endpoint = %target, "Connection check succeeded");
                CheckResult {
                    ok: true,
                    message: format!("Connected to {}: {}", target, detail),
                }
            }
            Err(e) => {
                warn!(credential_id = id, endpoint = %target, error = %e, "Connection check failed");
                CheckResult {
                    ok: false,
                    message: e.user_message(),
                }
            }
        })
    }

    async fn check_sftp(
        &self,
        params: &crate::domain::SftpParams,
    ) -> std::result::Result<String, RunError> {
        let mut session = self.files.connect(params).await?;
        let entries = session.list_dir(".").await?;
        Ok(format!("{} entries in home directory", entries.len()))
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CredentialKind;
    use crate::port::credential_vault::mocks::MemoryVault;
    use crate::port::file_server::mocks::MemoryFileServer;
    use crate::port::query_source::mocks::CannedQuerySource;
    use serde_json::json;

    fn vault() -> Arc<MemoryVault> {
        Arc::new(
            MemoryVault::new()
                .with(
                    1,
                    CredentialKind::Sftp,
                    json!({"host": "files.example.com", "username": "etl", "password": "pw"}),
                )
                .with(
                    2,
                    CredentialKind::Mssql,
                    json!({"server": "db", "database": "sales", "username": "sa", "password": "pw"}),
                ),
        )
    }

    #[tokio::test]
    async fn test_sftp_success_lists_home() {
        let server = MemoryFileServer::new();
        server.add_dir("./inbox");
        let checker = CredentialChecker::new(
            vault(),
            Arc::new(server.clone()),
            Arc::new(CannedQuerySource::from_rows(&["v"], &[])),
        );

        let result = checker.check(1).await.unwrap();
        assert!(result.ok, "{}", result.message);
        assert!(result.message.starts_with("Connected to sftp://etl@files.example.com:22"));
        assert_eq!(server.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_refused_connection_is_explained() {
        let server = MemoryFileServer::new();
        server.refuse_connections();
        let checker = CredentialChecker::new(
            vault(),
            Arc::new(server),
            Arc::new(CannedQuerySource::from_rows(&["v"], &[])),
        );

        let result = checker.check(1).await.unwrap();
        assert!(!result.ok);
        assert!(result.message.contains("Connection refused by server files.example.com:22"));
        assert!(!result.message.contains("pw"));
    }

    #[tokio::test]
    async fn test_mssql_ping() {
        let checker = CredentialChecker::new(
            vault(),
            Arc::new(MemoryFileServer::new()),
            Arc::new(CannedQuerySource::from_rows(&["v"], &[])),
        );
        let result = checker.check(2).await.unwrap();
        assert!(result.ok);
        assert!(result.message.ends_with("Microsoft SQL Server (mock)"));

        let failing = CredentialChecker::new(
            vault(),
            Arc::new(MemoryFileServer::new()),
            Arc::new(CannedQuerySource::failing("Login failed for user 'sa'")),
        );
        let result = failing.check(2).await.unwrap();
        assert!(!result.ok);
    }

    #[tokio::test]
    async fn test_missing_credential_is_not_found() {
        let checker = CredentialChecker::new(
            vault(),
            Arc::new(MemoryFileServer::new()),
            Arc::new(CannedQuerySource::from_rows(&["v"], &[])),
        );
        assert!(matches!(checker.check(99).await, Err(AppError::NotFound(_))));
    }
}
