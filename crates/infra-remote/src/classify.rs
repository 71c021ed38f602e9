// Transport error classification

use courier_core::domain::{ConnectionFailure, ConnectionTarget, RunError};
use ssh2::ErrorCode;
use std::io;

// libssh2 session error codes
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED: i32 = -19;

// SFTP status codes
pub(crate) const SFTP_NO_SUCH_FILE: i32 = 2;
const SFTP_PERMISSION_DENIED: i32 = 3;

pub(crate) fn is_not_found(err: &ssh2::Error) -> bool {
    matches!(err.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE))
}

/// Map an ssh2 error; `context` names the operation and path
pub(crate) fn ssh_error(target: &ConnectionTarget, context: &str, err: &ssh2::Error) -> RunError {
    let message = format!("{}: {}", context, err.message());
    let kind = match err.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => ConnectionFailure::TimedOut,
        ErrorCode::Session(LIBSSH2_ERROR_SOCKET_DISCONNECT) => ConnectionFailure::Unreachable,
        ErrorCode::Session(LIBSSH2_ERROR_AUTHENTICATION_FAILED)
        | ErrorCode::Session(LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED) => ConnectionFailure::AuthFailed,
        ErrorCode::SFTP(SFTP_PERMISSION_DENIED) => ConnectionFailure::AuthFailed,
        _ => ConnectionFailure::classify(&message),
    };
    RunError::connection(kind, target, message)
}

/// Authentication errors that carry no better hint are auth failures
pub(crate) fn auth_error(target: &ConnectionTarget, err: &ssh2::Error) -> RunError {
    match ssh_error(target, "authentication", err) {
        RunError::Connection {
            kind: ConnectionFailure::Unknown,
            target,
            message,
        } => RunError::Connection {
            kind: ConnectionFailure::AuthFailed,
            target,
            message,
        },
        other => other,
    }
}

pub(crate) fn io_error(target: &ConnectionTarget, context: &str, err: &io::Error) -> RunError {
    RunError::connection(
        ConnectionFailure::from_io(err),
        target,
        format!("{}: {}", context, err),
    )
}

pub(crate) fn sql_error(target: &ConnectionTarget, err: &tiberius::error::Error) -> RunError {
    use tiberius::error::Error;

    let kind = match err {
        Error::Io { kind, message } => {
            ConnectionFailure::from_io(&io::Error::new(*kind, message.clone()))
        }
        Error::Tls(_) => ConnectionFailure::Certificate,
        // 18456: login failed, 4060: cannot open database
        Error::Server(token) if token.code() == 18456 || token.code() == 4060 => {
            ConnectionFailure::AuthFailed
        }
        other => ConnectionFailure::classify(&other.to_string()),
    };
    RunError::connection(kind, target, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ConnectionTarget {
        ConnectionTarget::new("sftp", "files.example.com", 22, "etl")
    }

    #[test]
    fn test_ssh_codes() {
        let timeout = ssh2::Error::new(ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT), "Timed out waiting");
        assert!(matches!(
            ssh_error(&target(), "handshake", &timeout),
            RunError::Connection { kind: ConnectionFailure::TimedOut, .. }
        ));

        let missing = ssh2::Error::new(ErrorCode::SFTP(SFTP_NO_SUCH_FILE), "no such file");
        assert!(is_not_found(&missing));
    }

    #[test]
    fn test_auth_defaults_to_auth_failed() {
        let err = ssh2::Error::new(ErrorCode::Session(-1), "Unexpected reply");
        assert!(matches!(
            auth_error(&target(), &err),
            RunError::Connection { kind: ConnectionFailure::AuthFailed, .. }
        ));
    }

    #[test]
    fn test_io_refused() {
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let run_err = io_error(&target(), "connect", &err);
        assert!(run_err.user_message().starts_with("Connection refused by server files.example.com:22"));
    }

    #[test]
    fn test_sql_tls() {
        let err = tiberius::error::Error::Tls("invalid peer certificate".to_string());
        let target = ConnectionTarget::new("mssql", "db", 1433, "sa");
        assert!(matches!(
            sql_error(&target, &err),
            RunError::Connection { kind: ConnectionFailure::Certificate, .. }
        ));
    }
}
