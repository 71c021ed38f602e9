// SQLite CredentialVault Implementation

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use courier_core::domain::{Credential, CredentialId, CredentialKind, UserId};
use courier_core::error::{AppError, Result};
use courier_core::port::{CredentialVault, SecretCipher};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Credentials encrypted at rest; decrypted on every `decrypt` call
pub struct SqliteCredentialVault {
    pool: SqlitePool,
    cipher: Arc<dyn SecretCipher>,
}

impl SqliteCredentialVault {
    pub fn new(pool: SqlitePool, cipher: Arc<dyn SecretCipher>) -> Self {
        Self { pool, cipher }
    }

    /// Encrypt and store a parameter map, returning the new credential ID
    ///
    /// The map is validated against `kind` before anything is written.
    pub async fn store(
        &self,
        name: &str,
        kind: CredentialKind,
        user_id: UserId,
        params: &serde_json::Value,
    ) -> Result<CredentialId> {
        Credential::from_plaintext(0, name, user_id, kind, params)?;

        let plaintext = serde_json::to_vec(params)?;
        let sealed = STANDARD.encode(self.cipher.encrypt(&plaintext)?);

        let result = sqlx::query(
            "INSERT INTO credentials (name, kind, encrypted_data, user_id) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(kind.as_str())
        .bind(sealed)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let id = result.last_insert_rowid();
        debug!(credential_id = id, kind = %kind, "Credential stored");
        Ok(id)
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    name: String,
    kind: String,
    encrypted_data: String,
    user_id: i64,
}

#[async_trait]
impl CredentialVault for SqliteCredentialVault {
    async fn decrypt(&self, id: CredentialId) -> Result<Option<Credential>> {
        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT id, name, kind, encrypted_data, user_id FROM credentials WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind = CredentialKind::from_str(&row.kind)?;
        let sealed = STANDARD
            .decode(row.encrypted_data.as_bytes())
            .map_err(|e| AppError::Crypto(format!("credential {} is not valid base64: {}", id, e)))?;
        let plaintext = self.cipher.decrypt(&sealed)?;
        let params: serde_json::Value = serde_json::from_slice(&plaintext)?;

        let credential = Credential::from_plaintext(row.id, row.name, row.user_id, kind, &params)?;
        Ok(Some(credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, AesGcmCipher};
    use courier_core::domain::{CredentialParams, SftpAuth};
    use serde_json::json;
    use tokio_test::assert_err;

    async fn vault() -> (SqliteCredentialVault, SqlitePool) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let vault = SqliteCredentialVault::new(pool.clone(), Arc::new(AesGcmCipher::generate().unwrap()));
        (vault, pool)
    }

    #[tokio::test]
    async fn test_store_and_decrypt_sftp() {
        let (vault, pool) = vault().await;
        let id = vault
            .store(
                "partner-drop",
                CredentialKind::Sftp,
                7,
                &json!({"host": "sftp.partner.net", "port": "2222", "username": "etl", "password": "hunter2"}),
            )
            .await
            .unwrap();

        let stored: String = sqlx::query_scalar("SELECT encrypted_data FROM credentials WHERE id = ?")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(!stored.contains("hunter2"));

        let credential = vault.decrypt(id).await.unwrap().unwrap();
        assert_eq!(credential.user_id, 7);
        let CredentialParams::Sftp(params) = &credential.params else {
            panic!("expected sftp params");
        };
        assert_eq!(params.port, 2222);
        assert!(matches!(params.auth, SftpAuth::Password(_)));
        assert!(!format!("{:?}", credential).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_invalid_params_are_rejected_before_storing() {
        let (vault, pool) = vault().await;
        let err = assert_err!(
            vault
                .store("broken", CredentialKind::Mssql, 1, &json!({"server": "db"}))
                .await
        );
        assert!(matches!(err, AppError::Domain(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credentials")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_missing_and_foreign_key_material() {
        let (vault, pool) = vault().await;
        assert!(vault.decrypt(404).await.unwrap().is_none());

        let id = vault
            .store("db", CredentialKind::Mssql, 1, &json!({
                "server": "db", "database": "sales", "username": "sa", "password": "pw"
            }))
            .await
            .unwrap();

        // Same rows, different key
        let other = SqliteCredentialVault::new(pool, Arc::new(AesGcmCipher::generate().unwrap()));
        assert!(matches!(other.decrypt(id).await, Err(AppError::Crypto(_))));
    }
}
