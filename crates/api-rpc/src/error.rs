//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use courier_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use thiserror::Error;

/// RPC error codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const THROTTLED: i32 = 4003;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
    pub const SYSTEM_ERROR: i32 = 5002;
}

fn object(code: i32, message: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, message.into(), None::<()>)
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    match err {
        AppError::Validation(msg) => object(code::VALIDATION_ERROR, msg),
        AppError::Domain(e) => object(code::VALIDATION_ERROR, e.to_string()),
        AppError::Serialization(e) => object(code::VALIDATION_ERROR, e.to_string()),
        AppError::NotFound(msg) => object(code::NOT_FOUND, msg),
        AppError::Conflict(msg) => object(code::CONFLICT, msg),
        AppError::Storage(msg) => object(code::DB_ERROR, msg),
        AppError::Io(e) => object(code::SYSTEM_ERROR, e.to_string()),
        // Key material problems are not detailed to callers
        AppError::Crypto(_) => object(code::INTERNAL_ERROR, "Credential could not be decrypted"),
        AppError::Configuration(msg) | AppError::Internal(msg) => object(code::INTERNAL_ERROR, msg),
    }
}

pub fn throttled() -> ErrorObjectOwned {
    object(code::THROTTLED, "Rate limit exceeded. Please slow down.")
}

pub fn invalid_params(message: impl Into<String>) -> ErrorObjectOwned {
    object(code::VALIDATION_ERROR, message)
}

/// Server startup failure
#[derive(Error, Debug)]
pub enum StartError {
    #[error("Failed to bind RPC server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register RPC method: {0}")]
    Register(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::domain::DomainError;

    #[test]
    fn test_error_codes() {
        assert_eq!(to_rpc_error(AppError::NotFound("job 3".into())).code(), code::NOT_FOUND);
        assert_eq!(
            to_rpc_error(AppError::Conflict("Run queue is full".into())).code(),
            code::CONFLICT
        );
        assert_eq!(
            to_rpc_error(AppError::Domain(DomainError::UnknownJobType("x".into()))).code(),
            code::VALIDATION_ERROR
        );
    }

    #[test]
    fn test_crypto_detail_is_hidden() {
        let err = to_rpc_error(AppError::Crypto("aead::Unspecified key=abc".into()));
        assert_eq!(err.code(), code::INTERNAL_ERROR);
        assert!(!err.message().contains("key="));
    }
}
