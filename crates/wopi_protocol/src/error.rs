//! Error types for request decoding and the protocol error taxonomy.

use crate::lock::LockTokenError;
use thiserror::Error;

/// Result type for protocol decoding.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding a request into a protocol operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Path is not a file-scoped WOPI path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// HTTP method not used by the protocol.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// A header required by the operation is missing or empty.
    #[error("missing required header {0}")]
    MissingHeader(&'static str),

    /// `X-WOPI-Override` does not name an operation valid for this route.
    #[error("invalid override {0:?}")]
    InvalidOverride(String),

    /// Lock token header failed validation.
    #[error("invalid lock token: {0}")]
    InvalidLockToken(#[from] LockTokenError),

    /// Request body is not acceptable for the operation.
    #[error("invalid body: {0}")]
    InvalidBody(String),

    /// Timestamp header is neither ticks nor RFC 3339.
    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),
}

/// Closed classification of every failure a host reports to a client.
///
/// Each kind maps to exactly one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed header, path or override.
    BadRequest,
    /// Missing or invalid access token, or failed proof validation.
    Unauthenticated,
    /// Authenticated but not permitted to change the file.
    Forbidden,
    /// File id does not resolve.
    NotFound,
    /// Lock state machine conflict; the current lock is echoed back.
    LockMismatch,
    /// Overwrite of an unlocked, non-empty file.
    ConflictingChange,
    /// Rename target already exists.
    NameConflict,
    /// Rename target is not a legal file name.
    InvalidName,
    /// Request body exceeds the configured limit.
    PayloadTooLarge,
    /// Operation disabled by policy or not implemented by the repository.
    Unsupported,
    /// Storage or network timeout; the caller may retry.
    Transient,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Returns the HTTP status code for this kind.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::BadRequest | ErrorKind::InvalidName => 400,
            ErrorKind::Unauthenticated => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::LockMismatch | ErrorKind::ConflictingChange | ErrorKind::NameConflict => 409,
            ErrorKind::PayloadTooLarge => 413,
            ErrorKind::Internal => 500,
            ErrorKind::Unsupported => 501,
            ErrorKind::Transient => 503,
        }
    }

    /// Returns true if the caller may retry the request unchanged.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl ProtocolError {
    /// Every decoding failure is a client error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::BadRequest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorKind::BadRequest.status(), 400);
        assert_eq!(ErrorKind::Unauthenticated.status(), 401);
        assert_eq!(ErrorKind::NotFound.status(), 404);
        assert_eq!(ErrorKind::LockMismatch.status(), 409);
        assert_eq!(ErrorKind::Unsupported.status(), 501);
        assert_eq!(ErrorKind::Transient.status(), 503);
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(!ErrorKind::LockMismatch.is_retryable());
        assert!(!ErrorKind::Internal.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ProtocolError::MissingHeader("X-WOPI-Lock");
        assert!(err.to_string().contains("X-WOPI-Lock"));
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }
}
