//! User context capability.

use crate::error::EngineResult;
use chrono::{DateTime, Utc};

/// Per-request grant derived from an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// Subject user id, if the token names one.
    pub user_id: Option<String>,
    /// Display name of the subject.
    pub user_friendly_name: Option<String>,
    /// The token the grant was derived from.
    pub token: String,
    /// End of the token's validity window.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the subject may modify files.
    pub can_write: bool,
}

impl AccessGrant {
    /// Creates a writable grant with no subject.
    pub fn anonymous(token: impl Into<String>) -> Self {
        Self {
            user_id: None,
            user_friendly_name: None,
            token: token.into(),
            expires_at: None,
            can_write: true,
        }
    }

    /// Sets the subject.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the display name.
    pub fn with_friendly_name(mut self, name: impl Into<String>) -> Self {
        self.user_friendly_name = Some(name.into());
        self
    }

    /// Sets the expiry.
    pub fn with_expiry(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Marks the grant read-only.
    pub fn read_only(mut self) -> Self {
        self.can_write = false;
        self
    }
}

/// Resolves access tokens to grants.
pub trait UserContext: Send + Sync {
    /// Returns the grant for `token` on `file_id`, or `None` if the token is
    /// not valid for that file.
    fn resolve(&self, token: &str, file_id: &str) -> EngineResult<Option<AccessGrant>>;
}

/// Accepts any non-empty token as an anonymous writable grant.
#[derive(Debug, Clone, Default)]
pub struct DefaultUserContext;

impl UserContext for DefaultUserContext {
    fn resolve(&self, token: &str, _file_id: &str) -> EngineResult<Option<AccessGrant>> {
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(AccessGrant::anonymous(token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_accepts_any_token() {
        let grant = DefaultUserContext.resolve("abc", "doc-1").unwrap().unwrap();
        assert_eq!(grant.token, "abc");
        assert!(grant.user_id.is_none());
        assert!(grant.can_write);

        assert!(DefaultUserContext.resolve("", "doc-1").unwrap().is_none());
    }
}
