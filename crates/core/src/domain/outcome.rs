// Run outcome and run failure taxonomy

use crate::domain::credential::ConnectionTarget;
use crate::domain::error::DomainError;
use crate::domain::job::{JobId, JobStatus};
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::io;
use thiserror::Error;

/// Transport failure sub-classification, used for user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionFailure {
    Refused,
    TimedOut,
    Unreachable,
    AuthFailed,
    Certificate,
    Unknown,
}

impl ConnectionFailure {
    /// Classify from the transport's error text
    pub fn classify(message: &str) -> Self {
        let m = message.to_ascii_lowercase();
        if m.contains("connection refused") {
            ConnectionFailure::Refused
        } else if m.contains("timed out") || m.contains("login timeout expired") || m.contains("timeout") {
            ConnectionFailure::TimedOut
        } else if m.contains("network is unreachable")
            || m.contains("no route to host")
            || m.contains("failed to lookup address")
            || m.contains("name or service not known")
            || m.contains("connection reset by peer")
        {
            ConnectionFailure::Unreachable
        } else if m.contains("authentication failed")
            || m.contains("login failed for user")
            || m.contains("permission denied (publickey")
            || m.contains("unable to authenticate")
            || m.contains("cannot open database")
        {
            ConnectionFailure::AuthFailed
        } else if m.contains("ssl")
            || m.contains("tls")
            || m.contains("certificate")
            || m.contains("host key")
        {
            ConnectionFailure::Certificate
        } else {
            ConnectionFailure::Unknown
        }
    }

    /// Classify from an I/O error kind, falling back to its text
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ConnectionFailure::Refused,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectionFailure::TimedOut,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable => ConnectionFailure::Unreachable,
            io::ErrorKind::PermissionDenied => ConnectionFailure::AuthFailed,
            _ => Self::classify(&err.to_string()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionFailure::Refused => "refused",
            ConnectionFailure::TimedOut => "timed out",
            ConnectionFailure::Unreachable => "unreachable",
            ConnectionFailure::AuthFailed => "authentication failed",
            ConnectionFailure::Certificate => "certificate/SSL issue",
            ConnectionFailure::Unknown => "unknown",
        }
    }

    /// Short explanation for operators
    pub fn explain(self, target: &ConnectionTarget) -> String {
        let host = &target.host;
        let port = target.port;
        match self {
            ConnectionFailure::Refused => format!(
                "Connection refused by server {}:{}. The service may not be running on this port or a firewall is blocking it.",
                host, port
            ),
            ConnectionFailure::TimedOut => format!(
                "Connection to {}:{} timed out. The server may be down or a firewall may be dropping traffic.",
                host, port
            ),
            ConnectionFailure::Unreachable => format!(
                "Server {}:{} is unreachable. Check network connectivity and the host name.",
                host, port
            ),
            ConnectionFailure::AuthFailed => format!(
                "Authentication failed for user '{}' on {}. Please check the username and password/key.",
                target.username, host
            ),
            ConnectionFailure::Certificate => format!(
                "Secure channel to {}:{} could not be verified (certificate, SSL or host key problem).",
                host, port
            ),
            ConnectionFailure::Unknown => format!("Connection to {} failed.", target),
        }
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error class carried on a failed outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Connection,
    EmptyResult,
    UnknownJobType,
    Staging,
    Storage,
    Aborted,
}

/// Failure inside a run
///
/// Raised by strategies and adapters; the engine is the only place that
/// turns it into a Failure outcome.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error ({kind}) with {target}: {message}")]
    Connection {
        kind: ConnectionFailure,
        target: ConnectionTarget,
        message: String,
    },

    #[error("{0}")]
    EmptyResult(String),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Staging error: {context}")]
    Staging {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Run aborted: {0}")]
    Aborted(String),
}

impl RunError {
    pub fn connection(
        kind: ConnectionFailure,
        target: &ConnectionTarget,
        message: impl Into<String>,
    ) -> Self {
        RunError::Connection {
            kind,
            target: target.clone(),
            message: message.into(),
        }
    }

    /// Transport failure classified from its message text
    pub fn transport(target: &ConnectionTarget, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::connection(ConnectionFailure::classify(&message), target, message)
    }

    pub fn staging(context: impl Into<String>, source: io::Error) -> Self {
        RunError::Staging {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Configuration(_) => ErrorKind::Configuration,
            RunError::Connection { .. } => ErrorKind::Connection,
            RunError::EmptyResult(_) => ErrorKind::EmptyResult,
            RunError::UnknownJobType(_) => ErrorKind::UnknownJobType,
            RunError::Staging { .. } => ErrorKind::Staging,
            RunError::Storage(_) => ErrorKind::Storage,
            RunError::Aborted(_) => ErrorKind::Aborted,
        }
    }

    /// Short message for the job's log history
    pub fn user_message(&self) -> String {
        match self {
            RunError::Connection { kind, target, .. } => kind.explain(target),
            other => other.to_string(),
        }
    }

    /// Full error chain, one cause per line
    pub fn diagnostic(&self) -> String {
        let mut text = format!("{:?}", self);
        let mut source = self.source();
        while let Some(cause) = source {
            text.push_str("\ncaused by: ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        text
    }
}

impl From<DomainError> for RunError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::UnknownJobType(tag) => RunError::UnknownJobType(tag),
            DomainError::Configuration(msg) | DomainError::ValidationError(msg) => {
                RunError::Configuration(msg)
            }
            other @ DomainError::InvalidStateTransition { .. } => {
                RunError::Configuration(other.to_string())
            }
        }
    }
}

impl From<AppError> for RunError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Domain(d) => d.into(),
            AppError::NotFound(msg) | AppError::Configuration(msg) => RunError::Configuration(msg),
            other => RunError::Storage(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Success,
    Failure,
    Skipped,
}

impl OutcomeStatus {
    pub fn as_job_status(self) -> JobStatus {
        match self {
            OutcomeStatus::Success => JobStatus::Success,
            OutcomeStatus::Failure => JobStatus::Failure,
            OutcomeStatus::Skipped => JobStatus::Skipped,
        }
    }
}

/// One file confirmed on the destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferredFile {
    pub name: String,
    pub final_name: String,
    pub size_bytes: u64,
}

impl fmt::Display for TransferredFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.final_name {
            write!(f, "{} ({} bytes)", self.name, self.size_bytes)
        } else {
            write!(f, "{} -> {} ({} bytes)", self.name, self.final_name, self.size_bytes)
        }
    }
}

/// Structured result of one run; always produced, never an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub job_id: JobId,
    pub status: OutcomeStatus,
    pub message: String,
    pub details: Option<String>,
    pub files: Vec<TransferredFile>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl RunOutcome {
    pub fn success(
        job_id: JobId,
        message: impl Into<String>,
        details: Option<String>,
        files: Vec<TransferredFile>,
    ) -> Self {
        Self {
            job_id,
            status: OutcomeStatus::Success,
            message: message.into(),
            details,
            files,
            error: None,
            error_kind: None,
        }
    }

    pub fn skipped(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            job_id,
            status: OutcomeStatus::Skipped,
            message: message.into(),
            details: None,
            files: Vec::new(),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(
        job_id: JobId,
        error: &RunError,
        details: Option<String>,
        files: Vec<TransferredFile>,
    ) -> Self {
        Self {
            job_id,
            status: OutcomeStatus::Failure,
            message: error.user_message(),
            details,
            files,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
