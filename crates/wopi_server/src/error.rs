//! Error types for the protocol engine.

use crate::discovery::DiscoveryError;
use crate::lock::LockError;
use crate::repository::RepositoryError;
use thiserror::Error;
use wopi_protocol::{
    ErrorKind, ProtocolError, WopiResponse, HEADER_INVALID_FILE_NAME_ERROR, HEADER_LOCK,
    HEADER_LOCK_FAILURE_REASON,
};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while handling a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed request.
    #[error("bad request: {0}")]
    BadRequest(#[from] ProtocolError),

    /// Missing or invalid credential, or failed proof.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller may not modify the file.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Unknown file id.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Lock conflict; `current` is echoed in `X-WOPI-Lock`.
    #[error("lock mismatch on {file_id}: {reason}")]
    LockMismatch {
        /// File id.
        file_id: String,
        /// Current lock token, empty when unlocked.
        current: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Write to an unlocked file that the unlocked-put policy refuses.
    #[error("conflicting change on {file_id}: {reason}")]
    ConflictingChange {
        /// File id.
        file_id: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Rename target already in use.
    #[error("name conflict: {0}")]
    NameConflict(String),

    /// Rename target not a legal name.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Body exceeds the configured limit.
    #[error("payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge {
        /// Body size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Operation disabled or not implemented.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    /// Retryable storage or network failure.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::BadRequest(_) => ErrorKind::BadRequest,
            EngineError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::LockMismatch { .. } => ErrorKind::LockMismatch,
            EngineError::ConflictingChange { .. } => ErrorKind::ConflictingChange,
            EngineError::NameConflict(_) => ErrorKind::NameConflict,
            EngineError::InvalidName(_) => ErrorKind::InvalidName,
            EngineError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            EngineError::Unsupported(_) => ErrorKind::Unsupported,
            EngineError::Transient(_) => ErrorKind::Transient,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the HTTP status.
    pub fn status(&self) -> u16 {
        self.kind().status()
    }

    /// Returns true if the client may retry.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Builds the protocol response.
    ///
    /// Bodies are always empty; only protocol headers are attached, so
    /// backend detail never reaches the client.
    pub fn into_response(self) -> WopiResponse {
        let response = WopiResponse::status(self.status());
        match self {
            EngineError::LockMismatch {
                current, reason, ..
            } => response
                .with_header(HEADER_LOCK, current)
                .with_header(HEADER_LOCK_FAILURE_REASON, reason),
            EngineError::ConflictingChange { reason, .. } => response
                .with_header(HEADER_LOCK, "")
                .with_header(HEADER_LOCK_FAILURE_REASON, reason),
            EngineError::NameConflict(reason) | EngineError::InvalidName(reason) => {
                response.with_header(HEADER_INVALID_FILE_NAME_ERROR, reason)
            }
            _ => response,
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => EngineError::NotFound(id),
            RepositoryError::NameConflict(name) => EngineError::NameConflict(name),
            RepositoryError::InvalidName(name) => EngineError::InvalidName(name),
            RepositoryError::Unsupported(op) => EngineError::Unsupported(op),
            RepositoryError::PreconditionFailed {
                id,
                current_lock: Some(current),
            } => EngineError::LockMismatch {
                file_id: id,
                current,
                reason: "lock changed concurrently".into(),
            },
            RepositoryError::PreconditionFailed {
                id,
                current_lock: None,
            } => EngineError::ConflictingChange {
                file_id: id,
                reason: "file changed concurrently".into(),
            },
            RepositoryError::Timeout(msg) | RepositoryError::Unavailable(msg) => {
                EngineError::Transient(msg)
            }
            RepositoryError::Backend(msg) => EngineError::Internal(msg),
        }
    }
}

impl From<LockError> for EngineError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Mismatch {
                file_id,
                current,
                reason,
            } => EngineError::LockMismatch {
                file_id,
                current,
                reason: reason.into(),
            },
            LockError::ConflictingChange { file_id, reason } => EngineError::ConflictingChange {
                file_id,
                reason: reason.into(),
            },
            LockError::Contended { attempts } => {
                EngineError::Transient(format!("lock contended after {attempts} attempts"))
            }
            LockError::Repository(inner) => inner.into(),
        }
    }
}

impl From<DiscoveryError> for EngineError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::Fetch(_) | DiscoveryError::Parse(_) => {
                EngineError::Transient(err.to_string())
            }
            DiscoveryError::UnsupportedAction { .. } => EngineError::Unsupported("action"),
            DiscoveryError::NoProofKeys => EngineError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(EngineError::Unauthenticated("x".into()).status(), 401);
        assert_eq!(EngineError::NotFound("x".into()).status(), 404);
        assert_eq!(EngineError::Unsupported("rename").status(), 501);
        assert_eq!(
            EngineError::PayloadTooLarge { size: 2, limit: 1 }.status(),
            413
        );
        assert!(EngineError::Transient("db".into()).is_retryable());
        assert!(!EngineError::Internal("db".into()).is_retryable());
    }

    #[test]
    fn lock_mismatch_echoes_current_lock() {
        let response = EngineError::LockMismatch {
            file_id: "1".into(),
            current: "L2".into(),
            reason: "locked by another client".into(),
        }
        .into_response();

        assert_eq!(response.status, 409);
        assert_eq!(response.header(HEADER_LOCK), Some("L2"));
        assert!(response.header(HEADER_LOCK_FAILURE_REASON).is_some());
        assert!(response.body.to_bytes().is_empty());
    }

    #[test]
    fn conflicting_change_has_empty_lock() {
        let response = EngineError::ConflictingChange {
            file_id: "1".into(),
            reason: "not locked".into(),
        }
        .into_response();
        assert_eq!(response.status, 409);
        assert_eq!(response.header(HEADER_LOCK), Some(""));
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let response = EngineError::Internal("connection string secret".into()).into_response();
        assert_eq!(response.status, 500);
        assert!(response.headers.is_empty());
        assert!(response.body.to_bytes().is_empty());
    }

    #[test]
    fn repository_errors_map_to_kinds() {
        let err: EngineError = RepositoryError::Timeout("slow".into()).into();
        assert_eq!(err.kind(), ErrorKind::Transient);

        let err: EngineError = RepositoryError::PreconditionFailed {
            id: "1".into(),
            current_lock: Some("L".into()),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::LockMismatch);

        let err: EngineError = RepositoryError::Backend("disk".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn discovery_errors_map_to_kinds() {
        let err: EngineError = DiscoveryError::Fetch("timeout".into()).into();
        assert!(err.is_retryable());

        let err: EngineError = DiscoveryError::UnsupportedAction {
            extension: "xyz".into(),
            action: "edit".into(),
        }
        .into();
        assert_eq!(err.status(), 501);
    }
}
