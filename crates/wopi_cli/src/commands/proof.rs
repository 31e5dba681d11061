//! Proof commands.

use super::{open_discovery, print_json};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use wopi_protocol::{ProofMessage, Timestamp};
use wopi_server::{ProofValidator, ProofValidatorInput};

/// A rendered proof message.
#[derive(Debug, Serialize)]
pub struct MessageOutput {
    /// Timestamp in ticks.
    pub timestamp: i64,
    /// URL as signed.
    pub url: String,
    /// Message bytes, base64.
    pub message: String,
}

/// Renders the proof message for a token, URL and timestamp.
pub fn render(
    token: &str,
    url: &str,
    timestamp: Option<&str>,
) -> Result<MessageOutput, wopi_protocol::ProtocolError> {
    let timestamp = match timestamp {
        Some(raw) => Timestamp::parse(raw)?,
        None => Timestamp::from_datetime(Utc::now()),
    };
    let message = ProofMessage::new(token, url, timestamp);
    Ok(MessageOutput {
        timestamp: timestamp.ticks(),
        url: message.url().to_uppercase(),
        message: STANDARD.encode(message.to_bytes()),
    })
}

/// Runs the proof-message command.
pub fn message(
    token: &str,
    url: &str,
    timestamp: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = render(token, url, timestamp)?;
    if format == "json" {
        return print_json(&output);
    }
    println!("Timestamp: {}", output.timestamp);
    println!("Signed URL: {}", output.url);
    println!("Message: {}", output.message);
    Ok(())
}

/// Runs the verify-proof command.
pub fn verify(
    source: &str,
    input: &ProofValidatorInput,
    skew_minutes: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let validator = ProofValidator::new(open_discovery(source), Duration::from_secs(skew_minutes * 60));
    match validator.validate(input) {
        Ok(()) => {
            println!("Proof valid");
            Ok(())
        }
        Err(failure) => Err(format!("Proof invalid: {failure}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_uppercased_url() {
        let output = render(
            "tok",
            "https://h/wopi/files/a?access_token=tok",
            Some("635655897610773532"),
        )
        .unwrap();
        assert_eq!(output.timestamp, 635655897610773532);
        assert_eq!(output.url, "HTTPS://H/WOPI/FILES/A?ACCESS_TOKEN=TOK");

        let bytes = STANDARD.decode(output.message).unwrap();
        assert_eq!(&bytes[..4], &3u32.to_be_bytes());
        assert_eq!(&bytes[4..7], b"tok");
    }

    #[test]
    fn rejects_bad_timestamp() {
        assert!(render("tok", "https://h", Some("yesterday")).is_err());
    }
}
