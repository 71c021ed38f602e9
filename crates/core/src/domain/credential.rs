// Credential Domain Model
//
// Decrypted connection parameters. Secret fields are SecretString so that
// Debug output is redacted; only ConnectionTarget may appear in diagnostics.

use crate::domain::error::{DomainError, Result};
use crate::domain::job::UserId;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Credential ID (store-assigned)
pub type CredentialId = i64;

pub const DEFAULT_SFTP_PORT: u16 = 22;
pub const DEFAULT_MSSQL_PORT: u16 = 1433;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Sftp,
    Mssql,
}

impl CredentialKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialKind::Sftp => "sftp",
            CredentialKind::Mssql => "mssql",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sftp" => Ok(CredentialKind::Sftp),
            "mssql" => Ok(CredentialKind::Mssql),
            other => Err(DomainError::Configuration(format!(
                "Unknown credential type: {}",
                other
            ))),
        }
    }
}

/// SFTP authentication method
#[derive(Debug)]
pub enum SftpAuth {
    Password(SecretString),
    PrivateKey {
        key: SecretString,
        passphrase: Option<SecretString>,
    },
}

#[derive(Debug)]
pub struct SftpParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SftpAuth,
    pub disable_host_key_checking: bool,
}

impl SftpParams {
    pub fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new("sftp", &self.host, self.port, &self.username)
    }
}

/// TLS mode for MSSQL connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptMode {
    Yes,
    No,
    Strict,
}

impl FromStr for EncryptMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yes" | "true" | "mandatory" => Ok(EncryptMode::Yes),
            "no" | "false" | "optional" => Ok(EncryptMode::No),
            "strict" => Ok(EncryptMode::Strict),
            other => Err(DomainError::Configuration(format!(
                "Invalid encrypt mode '{}': expected yes, no or strict",
                other
            ))),
        }
    }
}

#[derive(Debug)]
pub struct MssqlParams {
    pub server: String,
    pub database: String,
    pub username: String,
    pub password: SecretString,
    pub port: u16,
    pub encrypt: EncryptMode,
    pub trust_server_certificate: bool,
}

impl MssqlParams {
    pub fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new("mssql", &self.server, self.port, &self.username)
    }
}

#[derive(Debug)]
pub enum CredentialParams {
    Sftp(SftpParams),
    Mssql(MssqlParams),
}

/// Decrypted credential, valid for the duration of one run
#[derive(Debug)]
pub struct Credential {
    pub id: CredentialId,
    pub name: String,
    pub user_id: UserId,
    pub params: CredentialParams,
}

impl Credential {
    /// Build a credential from its decrypted parameter map
    pub fn from_plaintext(
        id: CredentialId,
        name: impl Into<String>,
        user_id: UserId,
        kind: CredentialKind,
        plaintext: &Value,
    ) -> Result<Self> {
        let map = plaintext.as_object().ok_or_else(|| {
            DomainError::Configuration(format!("Credential {} parameters are not an object", id))
        })?;
        let params = match kind {
            CredentialKind::Sftp => CredentialParams::Sftp(parse_sftp(id, map)?),
            CredentialKind::Mssql => CredentialParams::Mssql(parse_mssql(id, map)?),
        };
        Ok(Self {
            id,
            name: name.into(),
            user_id,
            params,
        })
    }

    pub fn kind(&self) -> CredentialKind {
        match self.params {
            CredentialParams::Sftp(_) => CredentialKind::Sftp,
            CredentialParams::Mssql(_) => CredentialKind::Mssql,
        }
    }

    pub fn sftp(&self) -> Result<&SftpParams> {
        match &self.params {
            CredentialParams::Sftp(p) => Ok(p),
            CredentialParams::Mssql(_) => Err(self.wrong_kind(CredentialKind::Sftp)),
        }
    }

    pub fn mssql(&self) -> Result<&MssqlParams> {
        match &self.params {
            CredentialParams::Mssql(p) => Ok(p),
            CredentialParams::Sftp(_) => Err(self.wrong_kind(CredentialKind::Mssql)),
        }
    }

    pub fn target(&self) -> ConnectionTarget {
        match &self.params {
            CredentialParams::Sftp(p) => p.target(),
            CredentialParams::Mssql(p) => p.target(),
        }
    }

    fn wrong_kind(&self, expected: CredentialKind) -> DomainError {
        DomainError::Configuration(format!(
            "Credential {} ('{}') is of type {}, expected {}",
            self.id,
            self.name,
            self.kind(),
            expected
        ))
    }
}

/// Structural identity of a remote endpoint (never contains secrets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl ConnectionTarget {
    pub fn new(protocol: &str, host: &str, port: u16, username: &str) -> Self {
        Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            username: username.to_string(),
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}:{}",
            self.protocol, self.username, self.host, self.port
        )
    }
}

fn parse_sftp(id: CredentialId, map: &Map<String, Value>) -> Result<SftpParams> {
    let host = required_str(id, map, "host")?;
    let username = required_str(id, map, "username")?;
    let port = port_field(id, map, "port", DEFAULT_SFTP_PORT)?;

    let auth = match (optional_str(map, "private_key"), optional_str(map, "password")) {
        (Some(key), _) => SftpAuth::PrivateKey {
            key: secret(key),
            passphrase: optional_str(map, "passphrase")
                .or_else(|| optional_str(map, "private_key_pass"))
                .map(secret),
        },
        (None, Some(password)) => SftpAuth::Password(secret(password)),
        (None, None) => {
            return Err(DomainError::Configuration(format!(
                "Credential {} requires either 'password' or 'private_key'",
                id
            )))
        }
    };

    Ok(SftpParams {
        host,
        port,
        username,
        auth,
        disable_host_key_checking: bool_field(map, "disable_host_key_checking", false),
    })
}

fn parse_mssql(id: CredentialId, map: &Map<String, Value>) -> Result<MssqlParams> {
    let encrypt = match optional_str(map, "encrypt") {
        Some(mode) => mode.parse()?,
        None => EncryptMode::Yes,
    };
    Ok(MssqlParams {
        server: required_str(id, map, "server")?,
        database: required_str(id, map, "database")?,
        username: required_str(id, map, "username")?,
        password: secret(required_str(id, map, "password")?),
        port: port_field(id, map, "port", DEFAULT_MSSQL_PORT)?,
        encrypt,
        trust_server_certificate: bool_field(map, "trust_server_certificate", false),
    })
}

fn secret(value: String) -> SecretString {
    SecretString::new(value.into())
}

fn optional_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn required_str(id: CredentialId, map: &Map<String, Value>, key: &str) -> Result<String> {
    optional_str(map, key).ok_or_else(|| {
        DomainError::Configuration(format!("Credential {} is missing '{}'", id, key))
    })
}

// Form-backed credentials store ports as strings
fn port_field(id: CredentialId, map: &Map<String, Value>, key: &str, default: u16) -> Result<u16> {
    let invalid = || DomainError::Configuration(format!("Credential {} has an invalid '{}'", id, key));
    match map.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(default),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid()),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(invalid),
        Some(_) => Err(invalid()),
    }
}

fn bool_field(map: &Map<String, Value>, key: &str, default: bool) -> bool {
    match map.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1" | "on"
        ),
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serde_json::json;

    #[test]
    fn test_sftp_password_defaults() {
        let cred = Credential::from_plaintext(
            1,
            "in",
            7,
            CredentialKind::Sftp,
            &json!({"host": "files.example.com", "username": "etl", "password": "hunter2"}),
        )
        .unwrap();

        let sftp = cred.sftp().unwrap();
        assert_eq!(sftp.port, 22);
        assert!(!sftp.disable_host_key_checking);
        match &sftp.auth {
            SftpAuth::Password(p) => assert_eq!(p.expose_secret(), "hunter2"),
            other => panic!("unexpected auth: {:?}", other),
        }
        assert_eq!(cred.target().to_string(), "sftp://etl@files.example.com:22");
    }

    #[test]
    fn test_private_key_wins_and_accepts_legacy_passphrase_key() {
        let cred = Credential::from_plaintext(
            2,
            "key",
            7,
            CredentialKind::Sftp,
            &json!({
                "host": "h", "port": "2222", "username": "u",
                "password": "", "private_key": "-----BEGIN KEY-----",
                "private_key_pass": "pp"
            }),
        )
        .unwrap();

        let sftp = cred.sftp().unwrap();
        assert_eq!(sftp.port, 2222);
        match &sftp.auth {
            SftpAuth::PrivateKey { passphrase, .. } => {
                assert_eq!(passphrase.as_ref().unwrap().expose_secret(), "pp")
            }
            other => panic!("unexpected auth: {:?}", other),
        }
    }

    #[test]
    fn test_debug_output_is_redacted() {
        let cred = Credential::from_plaintext(
            3,
            "db",
            7,
            CredentialKind::Mssql,
            &json!({
                "server": "sql01", "database": "dw", "username": "report",
                "password": "s3cr3t-value", "encrypt": "strict"
            }),
        )
        .unwrap();

        let debug = format!("{:?}", cred);
        assert!(!debug.contains("s3cr3t-value"));
        let mssql = cred.mssql().unwrap();
        assert_eq!(mssql.port, 1433);
        assert_eq!(mssql.encrypt, EncryptMode::Strict);
    }

    #[test]
    fn test_missing_fields_are_configuration_errors() {
        let err = Credential::from_plaintext(
            4,
            "bad",
            7,
            CredentialKind::Sftp,
            &json!({"host": "h", "username": "u"}),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Configuration(_)));

        let err = Credential::from_plaintext(
            5,
            "bad",
            7,
            CredentialKind::Mssql,
            &json!({"server": "s", "database": "d", "username": "u", "password": "p", "encrypt": "maybe"}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected yes, no or strict"));
    }

    #[test]
    fn test_wrong_kind_for_role() {
        let cred = Credential::from_plaintext(
            6,
            "db",
            7,
            CredentialKind::Mssql,
            &json!({"server": "s", "database": "d", "username": "u", "password": "p"}),
        )
        .unwrap();
        assert!(cred.sftp().is_err());
    }
}
