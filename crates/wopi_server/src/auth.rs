//! Signed access tokens.
//!
//! Tokens bind a file id, a user id and an expiry under HMAC-SHA256, so a
//! token issued for one file cannot be replayed against another.
//!
//! ## Token Format
//!
//! - 2 bytes: file id length (big-endian), then the file id
//! - 2 bytes: user id length (big-endian), then the user id
//! - 8 bytes: expiry (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 over everything before it
//!
//! Encoded with URL-safe base64 without padding so it survives a query string.

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, EngineResult};
use crate::user::{AccessGrant, UserContext};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LEN: usize = 32;

/// Token signing configuration.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// HMAC secret.
    pub secret: Vec<u8>,
    /// Lifetime of issued tokens.
    pub ttl: Duration,
}

impl TokenConfig {
    /// Creates a configuration with a 10 hour lifetime.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            ttl: Duration::from_secs(10 * 60 * 60),
        }
    }

    /// Sets the token lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// A freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Encoded token.
    pub token: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Claims carried by a valid token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// File the token is scoped to.
    pub file_id: String,
    /// Subject user id.
    pub user_id: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates signed access tokens.
#[derive(Clone)]
pub struct SignedTokenAuthority {
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl SignedTokenAuthority {
    /// Creates an authority using the wall clock.
    pub fn new(config: TokenConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an authority with an explicit clock.
    pub fn with_clock(config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Issues a token for `user_id` on `file_id`.
    pub fn create_token(&self, file_id: &str, user_id: &str) -> EngineResult<IssuedToken> {
        let ttl = chrono::Duration::from_std(self.config.ttl)
            .map_err(|e| EngineError::Internal(format!("token ttl out of range: {e}")))?;
        let expires_at = self.clock.now() + ttl;

        let mut data = Vec::with_capacity(12 + file_id.len() + user_id.len());
        push_field(&mut data, file_id.as_bytes())?;
        push_field(&mut data, user_id.as_bytes())?;
        data.extend_from_slice(&expires_at.timestamp_millis().to_be_bytes());

        let signature = self.mac(&data)?.finalize().into_bytes();
        data.extend_from_slice(&signature);

        Ok(IssuedToken {
            token: URL_SAFE_NO_PAD.encode(data),
            expires_at,
        })
    }

    /// Validates a token for `expected_file_id`.
    pub fn validate_token(&self, token: &str, expected_file_id: &str) -> EngineResult<TokenClaims> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| EngineError::Unauthenticated("malformed token".into()))?;
        if raw.len() < SIGNATURE_LEN {
            return Err(EngineError::Unauthenticated("invalid token length".into()));
        }
        let (data, signature) = raw.split_at(raw.len() - SIGNATURE_LEN);

        self.mac(data)?
            .verify_slice(signature)
            .map_err(|_| EngineError::Unauthenticated("invalid signature".into()))?;

        let mut reader = FieldReader { rest: data };
        let file_id = reader.string()?;
        let user_id = reader.string()?;
        let expires_ms = reader.millis()?;

        if file_id != expected_file_id {
            return Err(EngineError::Unauthenticated("token issued for another file".into()));
        }
        let expires_at = DateTime::from_timestamp_millis(expires_ms)
            .ok_or_else(|| EngineError::Unauthenticated("invalid expiry".into()))?;
        if self.clock.now() >= expires_at {
            return Err(EngineError::Unauthenticated("token expired".into()));
        }

        Ok(TokenClaims {
            file_id,
            user_id,
            expires_at,
        })
    }

    fn mac(&self, data: &[u8]) -> EngineResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| EngineError::Internal(format!("invalid token secret: {e}")))?;
        mac.update(data);
        Ok(mac)
    }
}

impl UserContext for SignedTokenAuthority {
    fn resolve(&self, token: &str, file_id: &str) -> EngineResult<Option<AccessGrant>> {
        match self.validate_token(token, file_id) {
            Ok(claims) => Ok(Some(
                AccessGrant::anonymous(token)
                    .with_user(claims.user_id)
                    .with_expiry(claims.expires_at),
            )),
            Err(EngineError::Unauthenticated(reason)) => {
                tracing::debug!(file_id, %reason, "rejected access token");
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }
}

fn push_field(out: &mut Vec<u8>, bytes: &[u8]) -> EngineResult<()> {
    let len = u16::try_from(bytes.len())
        .map_err(|_| EngineError::Internal("token field too long".into()))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

struct FieldReader<'a> {
    rest: &'a [u8],
}

impl<'a> FieldReader<'a> {
    fn take(&mut self, n: usize) -> EngineResult<&'a [u8]> {
        if self.rest.len() < n {
            return Err(EngineError::Unauthenticated("truncated token".into()));
        }
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Ok(head)
    }

    fn string(&mut self) -> EngineResult<String> {
        let len = self.take(2)?;
        let len = usize::from(u16::from_be_bytes([len[0], len[1]]));
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| EngineError::Unauthenticated("token field is not UTF-8".into()))
    }

    fn millis(&mut self) -> EngineResult<i64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        if !self.rest.is_empty() {
            return Err(EngineError::Unauthenticated("trailing token bytes".into()));
        }
        Ok(i64::from_be_bytes(buf))
    }
}
