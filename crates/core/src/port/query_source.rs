// Query Source Port (relational source for exports, e.g. MSSQL)

use crate::domain::{MssqlParams, RunError};
use async_trait::async_trait;

/// Fully materialized result set, values rendered as text (NULL = `None`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait QuerySource: Send + Sync {
    /// Run `sql` and collect every row of the first result set
    async fn fetch_all(&self, params: &MssqlParams, sql: &str) -> Result<QueryResult, RunError>;

    /// Connect and return the server version string
    async fn ping(&self, params: &MssqlParams) -> Result<String, RunError>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Returns a canned result (or transport error) for every query
    pub struct CannedQuerySource {
        result: Mutex<std::result::Result<QueryResult, String>>,
        queries: Mutex<Vec<String>>,
    }

    impl CannedQuerySource {
        pub fn new(result: QueryResult) -> Self {
            Self {
                result: Mutex::new(Ok(result)),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn from_rows(columns: &[&str], rows: &[&[Option<&str>]]) -> Self {
            Self::new(QueryResult {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: rows
                    .iter()
                    .map(|r| r.iter().map(|v| v.map(str::to_string)).collect())
                    .collect(),
            })
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self {
                result: Mutex::new(Err(message.into())),
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl QuerySource for CannedQuerySource {
        async fn fetch_all(
            &self,
            params: &MssqlParams,
            sql: &str,
        ) -> Result<QueryResult, RunError> {
            self.queries.lock().unwrap().push(sql.to_string());
            self.result
                .lock()
                .unwrap()
                .clone()
                .map_err(|msg| RunError::transport(&params.target(), msg))
        }

        async fn ping(&self, params: &MssqlParams) -> Result<String, RunError> {
            match &*self.result.lock().unwrap() {
                Ok(_) => Ok("Microsoft SQL Server (mock)".to_string()),
                Err(msg) => Err(RunError::transport(&params.target(), msg.clone())),
            }
        }
    }
}
