use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("RPC protocol error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session {session_id} was modified concurrently (expected version {expected})")]
    VersionConflict { session_id: String, expected: i64 },

    #[error("Corrupt record {id}: {message}")]
    Corrupt { id: String, message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Question oracle errors
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Oracle rejected {operation}: {message}")]
    Rejected { operation: String, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Caller credential errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credential is required")]
    MissingCredential,

    #[error("Malformed credential: {reason}")]
    Malformed { reason: String },

    #[error("Credential signature is invalid")]
    InvalidSignature,

    #[error("Credential has expired")]
    Expired,
}

/// Session operation errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Session {session_id} does not belong to the caller")]
    Forbidden { session_id: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("User {user_id} already has an open session")]
    OpenSessionExists { user_id: String },

    #[error("Inconsistent state: {message}")]
    InconsistentState { message: String },
}

/// JSON-RPC protocol errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Invalid parameters for {method}: {message}")]
    InvalidParameters { method: String, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Machine-readable failure category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input.
    Validation,
    /// Missing/invalid credential, or the caller does not own the session.
    Auth,
    /// Session, doctor or user absent.
    NotFound,
    /// A second open session, or a concurrent modification.
    Conflict,
    /// The oracle failed or timed out.
    OracleUnavailable,
    /// The session cannot accept the operation in its current state.
    InconsistentState,
    /// Anything else; never exposed in detail.
    Internal,
}

impl ErrorKind {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Auth => "auth_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::OracleUnavailable => "oracle_unavailable",
            ErrorKind::InconsistentState => "inconsistent_state",
            ErrorKind::Internal => "internal",
        }
    }

    /// JSON-RPC error code for this kind.
    pub fn rpc_code(&self) -> i32 {
        match self {
            ErrorKind::Validation => -32602,
            ErrorKind::Auth => -32001,
            ErrorKind::OracleUnavailable => -32003,
            ErrorKind::NotFound => -32004,
            ErrorKind::Conflict => -32009,
            ErrorKind::InconsistentState => -32010,
            ErrorKind::Internal => -32603,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AppError {
    /// Classify this error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Oracle(_) => ErrorKind::OracleUnavailable,
            AppError::Auth(_) => ErrorKind::Auth,
            AppError::Session(err) => match err {
                SessionError::Validation { .. } => ErrorKind::Validation,
                SessionError::Forbidden { .. } => ErrorKind::Auth,
                SessionError::NotFound { .. } => ErrorKind::NotFound,
                SessionError::OpenSessionExists { .. } => ErrorKind::Conflict,
                SessionError::InconsistentState { .. } => ErrorKind::InconsistentState,
            },
            AppError::Storage(StorageError::VersionConflict { .. }) => ErrorKind::Conflict,
            AppError::Storage(StorageError::SessionNotFound { .. }) => ErrorKind::NotFound,
            AppError::Rpc(RpcError::InvalidParameters { .. }) => ErrorKind::Validation,
            AppError::Config { .. }
            | AppError::Storage(_)
            | AppError::Rpc(_)
            | AppError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
        .into()
    }

    /// Shorthand for an inconsistent-state failure.
    pub fn inconsistent(message: impl Into<String>) -> Self {
        SessionError::InconsistentState {
            message: message.into(),
        }
        .into()
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;

/// Result type alias for credential verification
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type alias for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::SessionNotFound {
            session_id: "sess-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: sess-123");

        let err = StorageError::VersionConflict {
            session_id: "sess-123".to_string(),
            expected: 4,
        };
        assert_eq!(
            err.to_string(),
            "Session sess-123 was modified concurrently (expected version 4)"
        );

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_oracle_error_display() {
        let err = OracleError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Oracle unavailable: server down (retries: 3)");

        let err = OracleError::Rejected {
            operation: "stageLimits".to_string(),
            message: "no model".to_string(),
        };
        assert_eq!(err.to_string(), "Oracle rejected stageLimits: no model");

        let err = OracleError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::Validation {
            field: "message".to_string(),
            reason: "cannot be empty".to_string(),
        };
        assert_eq!(err.to_string(), "Validation failed: message - cannot be empty");

        let err = SessionError::NotFound {
            entity: "Doctor",
            id: "doc-1".to_string(),
        };
        assert_eq!(err.to_string(), "Doctor not found: doc-1");
    }

    #[test]
    fn test_oracle_failures_are_oracle_unavailable() {
        let errors = [
            OracleError::Timeout { timeout_ms: 10 },
            OracleError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            },
            OracleError::InvalidResponse {
                message: "missing data".to_string(),
            },
        ];
        for err in errors {
            assert_eq!(AppError::from(err).kind(), ErrorKind::OracleUnavailable);
        }
    }

    #[test]
    fn test_session_error_kinds() {
        assert_eq!(
            AppError::validation("doctorId", "required").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::inconsistent("unknown label").kind(),
            ErrorKind::InconsistentState
        );
        let err: AppError = SessionError::Forbidden {
            session_id: "s".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Auth);
        let err: AppError = SessionError::OpenSessionExists {
            user_id: "u".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_storage_error_kinds() {
        let err: AppError = StorageError::VersionConflict {
            session_id: "s".to_string(),
            expected: 1,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: AppError = StorageError::Query {
            message: "syntax".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_auth_error_kind() {
        let err: AppError = AuthError::Expired.into();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.to_string(), "Authentication error: Credential has expired");
    }

    #[test]
    fn test_error_kind_codes() {
        assert_eq!(ErrorKind::Validation.rpc_code(), -32602);
        assert_eq!(ErrorKind::Internal.rpc_code(), -32603);
        assert_eq!(ErrorKind::OracleUnavailable.as_str(), "oracle_unavailable");
        assert_eq!(ErrorKind::Conflict.to_string(), "conflict");
    }
}
