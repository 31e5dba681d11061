//! Access token commands.

use super::print_json;
use serde::Serialize;
use std::time::Duration;
use wopi_server::{EngineResult, SignedTokenAuthority, TokenConfig};

/// Token details shown to the operator.
#[derive(Debug, Serialize)]
pub struct TokenOutput {
    /// Encoded token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// File id.
    pub file_id: String,
    /// User id.
    pub user_id: String,
    /// Expiry, RFC 3339.
    pub expires_at: String,
    /// Expiry as Unix milliseconds, the form host pages pass as `access_token_ttl`.
    pub access_token_ttl: i64,
}

fn authority(secret: &str, ttl_secs: u64) -> SignedTokenAuthority {
    SignedTokenAuthority::new(
        TokenConfig::new(secret.as_bytes().to_vec()).with_ttl(Duration::from_secs(ttl_secs)),
    )
}

/// Issues a token.
pub fn create(secret: &str, file_id: &str, user_id: &str, ttl_secs: u64) -> EngineResult<TokenOutput> {
    let issued = authority(secret, ttl_secs).create_token(file_id, user_id)?;
    Ok(TokenOutput {
        token: Some(issued.token),
        file_id: file_id.to_string(),
        user_id: user_id.to_string(),
        expires_at: issued.expires_at.to_rfc3339(),
        access_token_ttl: issued.expires_at.timestamp_millis(),
    })
}

/// Runs the issue-token command.
pub fn issue(
    secret: &str,
    file_id: &str,
    user_id: &str,
    ttl_secs: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = create(secret, file_id, user_id, ttl_secs)?;
    if format == "json" {
        return print_json(&output);
    }
    if let Some(token) = &output.token {
        println!("{token}");
    }
    println!("Expires: {} ({})", output.expires_at, output.access_token_ttl);
    Ok(())
}

/// Runs the check-token command.
pub fn check(
    secret: &str,
    file_id: &str,
    token: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let claims = authority(secret, 0).validate_token(token, file_id)?;
    let output = TokenOutput {
        token: None,
        file_id: claims.file_id,
        user_id: claims.user_id,
        expires_at: claims.expires_at.to_rfc3339(),
        access_token_ttl: claims.expires_at.timestamp_millis(),
    };
    if format == "json" {
        return print_json(&output);
    }
    println!("Token valid");
    println!("  File: {}", output.file_id);
    println!("  User: {}", output.user_id);
    println!("  Expires: {}", output.expires_at);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_checks_out() {
        let issued = create("s3cret", "doc-1", "alice", 3600).unwrap();
        let token = issued.token.unwrap();
        check("s3cret", "doc-1", &token, "json").unwrap();
        assert!(check("other", "doc-1", &token, "text").is_err());
        assert!(check("s3cret", "doc-2", &token, "text").is_err());
    }
}
