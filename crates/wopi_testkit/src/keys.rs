//! Proof key fixtures.
//!
//! Key generation is slow, so the two well-known pairs are generated once per
//! process from fixed seeds.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::sync::OnceLock;
use wopi_protocol::{ProofMessage, Timestamp};
use wopi_server::ProofKey;

const KEY_BITS: usize = 1024;

/// An RSA key pair standing in for the editing client's proof key.
#[derive(Clone)]
pub struct ProofKeyPair {
    private: RsaPrivateKey,
}

impl ProofKeyPair {
    /// Generates a key pair from a seed.
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let private = RsaPrivateKey::new(&mut rng, KEY_BITS).expect("Failed to generate RSA key");
        Self { private }
    }

    /// The shared "current" key.
    pub fn current() -> &'static ProofKeyPair {
        static KEY: OnceLock<ProofKeyPair> = OnceLock::new();
        KEY.get_or_init(|| Self::generate(0x0C0FFEE))
    }

    /// The shared "previous" key.
    pub fn previous() -> &'static ProofKeyPair {
        static KEY: OnceLock<ProofKeyPair> = OnceLock::new();
        KEY.get_or_init(|| Self::generate(0x0DECADE))
    }

    /// A third key no discovery document publishes.
    pub fn unrelated() -> &'static ProofKeyPair {
        static KEY: OnceLock<ProofKeyPair> = OnceLock::new();
        KEY.get_or_init(|| Self::generate(0x0BADBAD))
    }

    /// Big-endian modulus, base64.
    pub fn modulus_b64(&self) -> String {
        STANDARD.encode(self.private.n().to_bytes_be())
    }

    /// Big-endian public exponent, base64.
    pub fn exponent_b64(&self) -> String {
        STANDARD.encode(self.private.e().to_bytes_be())
    }

    /// The public half as the server models it.
    pub fn proof_key(&self) -> ProofKey {
        ProofKey {
            modulus: self.private.n().to_bytes_be(),
            exponent: self.private.e().to_bytes_be(),
        }
    }

    /// Signs raw bytes, returning base64.
    pub fn sign(&self, message: &[u8]) -> String {
        let signer = SigningKey::<Sha256>::new(self.private.clone());
        STANDARD.encode(signer.sign(message).to_vec())
    }

    /// Signs the proof message for a token, URL and timestamp.
    pub fn sign_request(&self, access_token: &str, url: &str, timestamp: Timestamp) -> String {
        self.sign(&ProofMessage::new(access_token, url, timestamp).to_bytes())
    }
}

impl std::fmt::Debug for ProofKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofKeyPair")
            .field("modulus", &self.modulus_b64())
            .finish()
    }
}
