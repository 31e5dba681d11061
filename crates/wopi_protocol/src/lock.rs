//! Lock token validation.

use thiserror::Error;

/// Maximum lock length when extended lock length is not negotiated.
pub const STANDARD_LOCK_LENGTH: usize = 256;
/// Maximum lock length when the host reports `SupportsExtendedLockLength`.
pub const EXTENDED_LOCK_LENGTH: usize = 1024;

/// Reasons a lock token is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockTokenError {
    /// Token is empty.
    #[error("lock token is empty")]
    Empty,

    /// Token contains a non-ASCII character.
    #[error("lock token contains non-ASCII characters")]
    NotAscii,

    /// Token is longer than the negotiated limit.
    #[error("lock token is {len} characters, limit is {limit}")]
    TooLong {
        /// Actual length.
        len: usize,
        /// Negotiated limit.
        limit: usize,
    },
}

/// A validated lock token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Validates a raw token against the negotiated length limit.
    pub fn parse(raw: &str, extended: bool) -> Result<Self, LockTokenError> {
        if raw.is_empty() {
            return Err(LockTokenError::Empty);
        }
        if !raw.is_ascii() {
            return Err(LockTokenError::NotAscii);
        }
        let limit = Self::limit(extended);
        if raw.len() > limit {
            return Err(LockTokenError::TooLong {
                len: raw.len(),
                limit,
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Returns the length limit for the given negotiation.
    pub fn limit(extended: bool) -> usize {
        if extended {
            EXTENDED_LOCK_LENGTH
        } else {
            STANDARD_LOCK_LENGTH
        }
    }

    /// Returns the token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
