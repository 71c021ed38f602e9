// MSSQL QuerySource Implementation (tiberius)

use crate::classify::{io_error, sql_error};
use crate::sftp::DEFAULT_CONNECT_TIMEOUT;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use courier_core::domain::{ConnectionFailure, ConnectionTarget, EncryptMode, MssqlParams, RunError};
use courier_core::port::{QueryResult, QuerySource};
use secrecy::ExposeSecret;
use std::fmt::Write as _;
use std::time::Duration;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

type SqlClient = Client<Compat<TcpStream>>;

pub struct MssqlSource {
    connect_timeout: Duration,
}

impl MssqlSource {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connect(&self, params: &MssqlParams) -> Result<SqlClient, RunError> {
        let target = params.target();
        let config = build_config(params);

        match tokio::time::timeout(self.connect_timeout, open(config, &target)).await {
            Ok(result) => result,
            Err(_) => Err(RunError::connection(
                ConnectionFailure::TimedOut,
                &target,
                format!(
                    "no response within {} seconds",
                    self.connect_timeout.as_secs()
                ),
            )),
        }
    }
}

impl Default for MssqlSource {
    fn default() -> Self {
        Self::new()
    }
}

fn encryption_level(mode: EncryptMode) -> EncryptionLevel {
    match mode {
        EncryptMode::No => EncryptionLevel::Off,
        // TDS 8 strict mode is not available; closest is required TLS with verification
        EncryptMode::Yes | EncryptMode::Strict => EncryptionLevel::Required,
    }
}

fn build_config(params: &MssqlParams) -> Config {
    let mut config = Config::new();
    config.host(&params.server);
    config.port(params.port);
    config.database(&params.database);
    config.application_name("courier");
    config.authentication(AuthMethod::sql_server(
        &params.username,
        params.password.expose_secret(),
    ));
    config.encryption(encryption_level(params.encrypt));
    if trusts_certificate(params) {
        config.trust_cert();
    }
    config
}

// Strict always verifies the server certificate
fn trusts_certificate(params: &MssqlParams) -> bool {
    params.trust_server_certificate && params.encrypt != EncryptMode::Strict
}

async fn open(config: Config, target: &ConnectionTarget) -> Result<SqlClient, RunError> {
    let tcp = TcpStream::connect(config.get_addr())
        .await
        .map_err(|e| io_error(target, "connect", &e))?;
    tcp.set_nodelay(true)
        .map_err(|e| io_error(target, "connect", &e))?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways redirect to the node hosting the database
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!(host = %host, port, "Following MSSQL routing redirect");
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| io_error(target, "connect", &e))?;
            Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| sql_error(target, &e))
        }
        Err(e) => Err(sql_error(target, &e)),
    }
}

#[async_trait]
impl QuerySource for MssqlSource {
    async fn fetch_all(&self, params: &MssqlParams, sql: &str) -> Result<QueryResult, RunError> {
        let target = params.target();
        let mut client = self.connect(params).await?;

        let mut stream = client
            .simple_query(sql)
            .await
            .map_err(|e| sql_error(&target, &e))?;
        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(|e| sql_error(&target, &e))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| sql_error(&target, &e))?;

        let rows: Vec<Vec<Option<String>>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|value| render(&value)).collect())
            .collect();

        info!(
            endpoint = %target,
            database = %params.database,
            columns = columns.len(),
            rows = rows.len(),
            "Query complete"
        );
        Ok(QueryResult { columns, rows })
    }

    async fn ping(&self, params: &MssqlParams) -> Result<String, RunError> {
        let target = params.target();
        let mut client = self.connect(params).await?;

        let row = client
            .simple_query("SELECT @@VERSION")
            .await
            .map_err(|e| sql_error(&target, &e))?
            .into_row()
            .await
            .map_err(|e| sql_error(&target, &e))?;

        Ok(row
            .and_then(|r| r.into_iter().next())
            .and_then(|value| render(&value))
            .unwrap_or_else(|| "Microsoft SQL Server".to_string()))
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        let _ = write!(out, "{:02X}", b);
    }
    out
}

fn temporal<'a, T>(value: &'a ColumnData<'static>) -> Option<String>
where
    T: FromSql<'a> + ToString,
{
    T::from_sql(value).ok().flatten().map(|v| v.to_string())
}

/// Render one cell as text; SQL NULL is `None`
fn render(value: &ColumnData<'static>) -> Option<String> {
    match value {
        ColumnData::U8(v) => v.map(|v| v.to_string()),
        ColumnData::I16(v) => v.map(|v| v.to_string()),
        ColumnData::I32(v) => v.map(|v| v.to_string()),
        ColumnData::I64(v) => v.map(|v| v.to_string()),
        ColumnData::F32(v) => v.map(|v| v.to_string()),
        ColumnData::F64(v) => v.map(|v| v.to_string()),
        ColumnData::Bit(v) => v.map(|b| if b { "True" } else { "False" }.to_string()),
        ColumnData::String(v) => v.as_ref().map(|s| s.to_string()),
        ColumnData::Guid(v) => v.as_ref().map(|g| g.to_string()),
        ColumnData::Numeric(v) => v.as_ref().map(|n| n.to_string()),
        ColumnData::Binary(v) => v.as_ref().map(|b| hex(b)),
        ColumnData::Xml(v) => v.as_ref().map(|x| x.clone().into_owned().into_string()),
        ColumnData::Date(_) => temporal::<NaiveDate>(value),
        ColumnData::Time(_) => temporal::<NaiveTime>(value),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(value)
        }
        ColumnData::DateTimeOffset(_) => temporal::<DateTime<FixedOffset>>(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::borrow::Cow;

    fn params(encrypt: EncryptMode, trust: bool) -> MssqlParams {
        MssqlParams {
            server: "127.0.0.1".to_string(),
            database: "sales".to_string(),
            username: "sa".to_string(),
            password: SecretString::new("pw".into()),
            port: 1,
            encrypt,
            trust_server_certificate: trust,
        }
    }

    #[test]
    fn test_encryption_mapping() {
        assert!(matches!(encryption_level(EncryptMode::No), EncryptionLevel::Off));
        assert!(matches!(encryption_level(EncryptMode::Yes), EncryptionLevel::Required));
        assert!(matches!(encryption_level(EncryptMode::Strict), EncryptionLevel::Required));
    }

    #[test]
    fn test_certificate_trust_needs_flag_and_non_strict_mode() {
        assert!(trusts_certificate(&params(EncryptMode::Yes, true)));
        assert!(trusts_certificate(&params(EncryptMode::No, true)));
        assert!(!trusts_certificate(&params(EncryptMode::Yes, false)));
        assert!(!trusts_certificate(&params(EncryptMode::Strict, true)));
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(render(&ColumnData::I32(Some(42))), Some("42".to_string()));
        assert_eq!(render(&ColumnData::I32(None)), None);
        assert_eq!(render(&ColumnData::Bit(Some(true))), Some("True".to_string()));
        assert_eq!(
            render(&ColumnData::String(Some(Cow::Borrowed("a,b")))),
            Some("a,b".to_string())
        );
        assert_eq!(
            render(&ColumnData::Binary(Some(Cow::Owned(vec![0xde, 0xad])))),
            Some("0xDEAD".to_string())
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_classified() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut params = params(EncryptMode::No, false);
        params.port = port;

        let err = MssqlSource::new().ping(&params).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Connection {
                kind: ConnectionFailure::Refused,
                ..
            }
        ));
        assert!(!err.user_message().contains("pw"));
    }
}
