//! Proof validation.
//!
//! Checks that a request was signed by the editing client. A request passes
//! if any of these verifies, for the URL as received and, when configured,
//! for the same path under the host's own public URL:
//!
//! | Signature | Key |
//! |---|---|
//! | `X-WOPI-Proof` | current |
//! | `X-WOPI-ProofOld` | current |
//! | `X-WOPI-Proof` | previous |
//!
//! The timestamp must also lie within the configured skew of now, whatever
//! the signatures say.

use crate::clock::{Clock, SystemClock};
use crate::discovery::{DiscoveryCache, DiscoveryError, ProofKey};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::{BigUint, RsaPublicKey};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use wopi_protocol::{
    ProofMessage, Timestamp, WopiRequest, HEADER_PROOF, HEADER_PROOF_OLD, HEADER_TIMESTAMP,
};

/// Why a proof was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofFailure {
    /// Token, proof or timestamp header missing.
    #[error("missing proof headers")]
    MissingHeaders,

    /// Timestamp header unparseable.
    #[error("invalid proof timestamp {0:?}")]
    InvalidTimestamp(String),

    /// Timestamp outside the accepted skew.
    #[error("proof timestamp {0} outside accepted window")]
    Expired(i64),

    /// Proof keys unavailable.
    #[error("proof keys unavailable: {0}")]
    Keys(#[from] DiscoveryError),

    /// No signature and key combination verified.
    #[error("proof signature did not verify")]
    BadSignature,
}

/// Everything a proof check needs from one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofValidatorInput {
    /// `access_token` query value.
    pub access_token: String,
    /// Full request URL as the client sent it.
    pub url: String,
    /// Raw `X-WOPI-TimeStamp`.
    pub timestamp: Option<String>,
    /// Raw `X-WOPI-Proof`.
    pub proof: Option<String>,
    /// Raw `X-WOPI-ProofOld`.
    pub proof_old: Option<String>,
}

impl ProofValidatorInput {
    /// Extracts the proof inputs from a request.
    pub fn from_request(request: &WopiRequest) -> Self {
        let header = |name: &str| request.headers.get_non_empty(name).map(str::to_string);
        Self {
            access_token: request.access_token().unwrap_or_default().to_string(),
            url: request.url.clone(),
            timestamp: header(HEADER_TIMESTAMP),
            proof: header(HEADER_PROOF),
            proof_old: header(HEADER_PROOF_OLD),
        }
    }
}

/// Verifies request proofs against the discovery proof keys.
pub struct ProofValidator {
    discovery: Arc<DiscoveryCache>,
    clock_skew: chrono::Duration,
    host_url: Option<String>,
    clock: Arc<dyn Clock>,
}

impl ProofValidator {
    /// Creates a validator reading keys from `discovery`.
    pub fn new(discovery: Arc<DiscoveryCache>, clock_skew: Duration) -> Self {
        Self {
            discovery,
            clock_skew: chrono::Duration::from_std(clock_skew)
                .unwrap_or_else(|_| chrono::Duration::minutes(20)),
            host_url: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Also tries the request path under the host's own public URL.
    pub fn with_host_url(mut self, host_url: impl Into<String>) -> Self {
        self.host_url = Some(host_url.into());
        self
    }

    /// Sets the clock used for the skew check.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns true if the request proof is acceptable.
    pub fn is_valid(&self, input: &ProofValidatorInput) -> bool {
        match self.validate(input) {
            Ok(()) => true,
            Err(failure) => {
                warn!(url = %input.url, %failure, "proof validation failed");
                false
            }
        }
    }

    /// Checks the proof, reporting why it failed.
    pub fn validate(&self, input: &ProofValidatorInput) -> Result<(), ProofFailure> {
        let (Some(raw_ts), Some(proof)) = (input.timestamp.as_deref(), input.proof.as_deref())
        else {
            return Err(ProofFailure::MissingHeaders);
        };
        if input.access_token.is_empty() {
            return Err(ProofFailure::MissingHeaders);
        }

        let timestamp = Timestamp::parse(raw_ts)
            .map_err(|_| ProofFailure::InvalidTimestamp(raw_ts.to_string()))?;
        if !timestamp.is_within(self.clock.now(), self.clock_skew) {
            return Err(ProofFailure::Expired(timestamp.ticks()));
        }

        let keys = self.discovery.proof_keys()?;
        let current = verifying_key(&keys.current);
        let previous = keys.previous.as_ref().and_then(verifying_key);

        let proof = decode_signature(proof);
        let proof_old = input.proof_old.as_deref().and_then(decode_signature);

        let mut combos: Vec<(&Signature, &VerifyingKey<Sha256>)> = Vec::with_capacity(3);
        if let Some(current) = current.as_ref() {
            combos.extend(proof.as_ref().map(|sig| (sig, current)));
            combos.extend(proof_old.as_ref().map(|sig| (sig, current)));
        }
        if let Some(previous) = previous.as_ref() {
            combos.extend(proof.as_ref().map(|sig| (sig, previous)));
        }

        for url in self.url_variants(&input.url) {
            let message = ProofMessage::new(input.access_token.as_str(), url.as_str(), timestamp)
                .to_bytes();
            if combos
                .iter()
                .any(|&(sig, key)| key.verify(&message, sig).is_ok())
            {
                debug!(url = %url, "proof verified");
                return Ok(());
            }
        }
        Err(ProofFailure::BadSignature)
    }

    fn url_variants(&self, received: &str) -> Vec<String> {
        let mut variants = vec![received.to_string()];
        if let Some(host) = self.host_url.as_deref().and_then(|h| url::Url::parse(h).ok()) {
            let path_and_query = match url::Url::parse(received) {
                Ok(parsed) => match parsed.query() {
                    Some(q) => format!("{}?{q}", parsed.path()),
                    None => parsed.path().to_string(),
                },
                Err(_) => received.to_string(),
            };
            let rebased = format!("{}{path_and_query}", host.origin().ascii_serialization());
            if !rebased.eq_ignore_ascii_case(received) {
                variants.push(rebased);
            }
        }
        variants
    }
}

fn verifying_key(key: &ProofKey) -> Option<VerifyingKey<Sha256>> {
    let public = RsaPublicKey::new(
        BigUint::from_bytes_be(&key.modulus),
        BigUint::from_bytes_be(&key.exponent),
    )
    .ok()?;
    Some(VerifyingKey::<Sha256>::new(public))
}

fn decode_signature(raw: &str) -> Option<Signature> {
    let bytes = STANDARD.decode(raw.trim()).ok()?;
    Signature::try_from(bytes.as_slice()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::discovery::{DiscoveryDocument, StaticFetcher};
    use chrono::{TimeZone, Utc};
    use rsa::pkcs1v15::SigningKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::traits::PublicKeyParts;
    use rsa::RsaPrivateKey;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::OnceLock;

    fn keys() -> &'static (RsaPrivateKey, RsaPrivateKey) {
        static KEYS: OnceLock<(RsaPrivateKey, RsaPrivateKey)> = OnceLock::new();
        KEYS.get_or_init(|| {
            let mut rng = StdRng::seed_from_u64(7);
            (
                RsaPrivateKey::new(&mut rng, 1024).unwrap(),
                RsaPrivateKey::new(&mut rng, 1024).unwrap(),
            )
        })
    }

    fn b64(bytes: Vec<u8>) -> String {
        STANDARD.encode(bytes)
    }

    fn discovery_xml(current: &RsaPrivateKey, old: &RsaPrivateKey) -> String {
        format!(
            r#"<wopi-discovery><proof-key value="" modulus="{}" exponent="{}" oldvalue="" oldmodulus="{}" oldexponent="{}"/></wopi-discovery>"#,
            b64(current.n().to_bytes_be()),
            b64(current.e().to_bytes_be()),
            b64(old.n().to_bytes_be()),
            b64(old.e().to_bytes_be()),
        )
    }

    fn sign(key: &RsaPrivateKey, token: &str, url: &str, ts: Timestamp) -> String {
        let signer = SigningKey::<Sha256>::new(key.clone());
        let message = ProofMessage::new(token, url, ts).to_bytes();
        b64(signer.sign(&message).to_vec())
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn validator(current: &RsaPrivateKey, old: &RsaPrivateKey) -> ProofValidator {
        let doc = DiscoveryDocument::parse(&discovery_xml(current, old)).unwrap();
        let cache = DiscoveryCache::new("mem", Box::new(StaticFetcher::default())).with_document(doc);
        ProofValidator::new(Arc::new(cache), Duration::from_secs(20 * 60))
            .with_clock(Arc::new(ManualClock::new(now())))
    }

    const URL: &str = "https://host.example/wopi/files/doc-1?access_token=tok";

    fn input(proof: Option<String>, proof_old: Option<String>, ts: Timestamp) -> ProofValidatorInput {
        ProofValidatorInput {
            access_token: "tok".into(),
            url: URL.into(),
            timestamp: Some(ts.to_string()),
            proof,
            proof_old,
        }
    }

    #[test]
    fn accepts_current_key() {
        let (current, old) = keys();
        let ts = Timestamp::from_datetime(now());
        let v = validator(current, old);
        assert_eq!(v.validate(&input(Some(sign(current, "tok", URL, ts)), None, ts)), Ok(()));
    }

    #[test]
    fn accepts_rotated_keys() {
        let (current, old) = keys();
        let ts = Timestamp::from_datetime(now());
        let v = validator(current, old);

        // Client still signing with what the host knows as the previous key.
        let by_old = sign(old, "tok", URL, ts);
        assert!(v.is_valid(&input(Some(by_old), None, ts)));

        // Host still publishing the previous key as current: ProofOld matches.
        let v = validator(old, current);
        let proof = sign(current, "tok", URL, ts);
        let proof_old = sign(old, "tok", URL, ts);
        assert!(v.is_valid(&input(Some(proof), Some(proof_old), ts)));
    }

    #[test]
    fn rejects_stale_timestamp_even_if_signed() {
        let (current, old) = keys();
        let ts = Timestamp::from_datetime(now() - chrono::Duration::minutes(21));
        let v = validator(current, old);
        let proof = sign(current, "tok", URL, ts);
        assert_eq!(
            v.validate(&input(Some(proof), None, ts)),
            Err(ProofFailure::Expired(ts.ticks()))
        );
    }

    #[test]
    fn rejects_wrong_key_and_tampering() {
        let (current, old) = keys();
        let ts = Timestamp::from_datetime(now());
        let v = validator(current, current);

        let by_old = sign(old, "tok", URL, ts);
        assert_eq!(
            v.validate(&input(Some(by_old), None, ts)),
            Err(ProofFailure::BadSignature)
        );

        let other_token = sign(current, "other", URL, ts);
        assert!(!v.is_valid(&input(Some(other_token), None, ts)));
        assert!(!v.is_valid(&input(Some("not base64!".into()), None, ts)));
    }

    #[test]
    fn missing_headers() {
        let (current, old) = keys();
        let v = validator(current, old);
        let ts = Timestamp::from_datetime(now());
        assert_eq!(
            v.validate(&input(None, None, ts)),
            Err(ProofFailure::MissingHeaders)
        );
    }

    #[test]
    fn host_url_variant() {
        let (current, old) = keys();
        let ts = Timestamp::from_datetime(now());
        let v = validator(current, old).with_host_url("https://public.example/wopi");

        // Client signed the public URL; request arrived rewritten by a proxy.
        let public = "https://public.example/wopi/files/doc-1?access_token=tok";
        let mut req = input(Some(sign(current, "tok", public, ts)), None, ts);
        req.url = "http://10.0.0.5:8080/wopi/files/doc-1?access_token=tok".into();
        assert!(v.is_valid(&req));
    }

    #[test]
    fn no_keys_is_reported() {
        let cache = DiscoveryCache::new("mem", Box::new(StaticFetcher::default()))
            .with_document(DiscoveryDocument::parse("<wopi-discovery/>").unwrap());
        let v = ProofValidator::new(Arc::new(cache), Duration::from_secs(1200))
            .with_clock(Arc::new(ManualClock::new(now())));
        let ts = Timestamp::from_datetime(now());
        assert_eq!(
            v.validate(&input(Some("AAAA".into()), None, ts)),
            Err(ProofFailure::Keys(DiscoveryError::NoProofKeys))
        );
    }
}
