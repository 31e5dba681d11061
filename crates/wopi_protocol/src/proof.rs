//! Proof message construction and request timestamps.
//!
//! A WOPI client signs every request with its proof key. The signed bytes are
//! three length-prefixed fields, each prefix a 4-byte big-endian integer:
//!
//! | Field | Bytes |
//! |---|---|
//! | access token | UTF-8 |
//! | request URL | UTF-8 of the upper-cased absolute URL |
//! | timestamp | 8-byte big-endian .NET ticks |

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const EPOCH_OFFSET_SECS: i64 = 62_135_596_800;
const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

/// A request timestamp in .NET ticks (100 ns intervals since 0001-01-01 UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Wraps a raw tick count.
    pub fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Converts a UTC instant to ticks.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        let secs = at.timestamp() + EPOCH_OFFSET_SECS;
        let sub = i64::from(at.timestamp_subsec_nanos()) / NANOS_PER_TICK;
        Self(secs * TICKS_PER_SECOND + sub)
    }

    /// Parses an `X-WOPI-TimeStamp` value.
    ///
    /// Clients send decimal ticks; RFC 3339 instants are accepted as well and
    /// converted to ticks.
    pub fn parse(raw: &str) -> ProtocolResult<Self> {
        let raw = raw.trim();
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            return raw
                .parse::<i64>()
                .map(Self)
                .map_err(|_| ProtocolError::InvalidTimestamp(raw.to_string()));
        }
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| Self::from_datetime(dt.with_timezone(&Utc)))
            .map_err(|_| ProtocolError::InvalidTimestamp(raw.to_string()))
    }

    /// Returns the tick count.
    pub fn ticks(self) -> i64 {
        self.0
    }

    /// Converts back to a UTC instant, if representable.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        let secs = self.0.div_euclid(TICKS_PER_SECOND) - EPOCH_OFFSET_SECS;
        let nanos = self.0.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
        DateTime::from_timestamp(secs, nanos as u32)
    }

    /// Returns true if this timestamp lies within `window` of `now`, either side.
    pub fn is_within(self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        match self.to_datetime() {
            Some(at) => {
                let delta = now - at;
                delta <= window && delta >= -window
            }
            None => false,
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The byte sequence a client signs for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofMessage {
    access_token: String,
    url: String,
    timestamp: Timestamp,
}

impl ProofMessage {
    /// Creates the message for a token, absolute request URL and timestamp.
    pub fn new(access_token: impl Into<String>, url: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            access_token: access_token.into(),
            url: url.into(),
            timestamp,
        }
    }

    /// Returns the URL this message signs.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Encodes the signed byte sequence.
    pub fn to_bytes(&self) -> Vec<u8> {
        let token = self.access_token.as_bytes();
        let url = self.url.to_uppercase();
        let url = url.as_bytes();
        let ticks = self.timestamp.ticks().to_be_bytes();

        let mut out = Vec::with_capacity(12 + token.len() + url.len() + ticks.len());
        push_field(&mut out, token);
        push_field(&mut out, url);
        push_field(&mut out, &ticks);
        out
    }
}

fn push_field(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unix_epoch_in_ticks() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(Timestamp::from_datetime(epoch).ticks(), 621_355_968_000_000_000);
    }

    #[test]
    fn ticks_round_trip_to_datetime() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let ts = Timestamp::from_datetime(at);
        assert_eq!(ts.to_datetime(), Some(at));
    }

    #[test]
    fn parse_ticks_and_rfc3339() {
        let ticks = Timestamp::parse("635655897610773532").unwrap();
        assert_eq!(ticks.ticks(), 635_655_897_610_773_532);

        let iso = Timestamp::parse("1970-01-01T00:00:00Z").unwrap();
        assert_eq!(iso.ticks(), 621_355_968_000_000_000);

        assert!(Timestamp::parse("yesterday").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn window_check() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window = chrono::Duration::minutes(20);
        let recent = Timestamp::from_datetime(now - chrono::Duration::minutes(5));
        let stale = Timestamp::from_datetime(now - chrono::Duration::minutes(25));
        let future = Timestamp::from_datetime(now + chrono::Duration::minutes(25));
        assert!(recent.is_within(now, window));
        assert!(!stale.is_within(now, window));
        assert!(!future.is_within(now, window));
    }

    #[test]
    fn message_layout() {
        let msg = ProofMessage::new("tok", "https://h/x?a=b", Timestamp::from_ticks(1));
        let bytes = msg.to_bytes();

        assert_eq!(&bytes[0..4], &3u32.to_be_bytes());
        assert_eq!(&bytes[4..7], b"tok");
        assert_eq!(&bytes[7..11], &15u32.to_be_bytes());
        assert_eq!(&bytes[11..26], b"HTTPS://H/X?A=B");
        assert_eq!(&bytes[26..30], &8u32.to_be_bytes());
        assert_eq!(&bytes[30..38], &1i64.to_be_bytes());
        assert_eq!(bytes.len(), 38);
    }
}
