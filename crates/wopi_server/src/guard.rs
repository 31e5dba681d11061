//! Request admission guards.
//!
//! Guards run before any file is looked up. Each one either admits the
//! request or rejects it with the error the client should see.

use crate::discovery::DiscoveryError;
use crate::error::{EngineError, EngineResult};
use crate::policy::FeaturePolicy;
use crate::proof::{ProofFailure, ProofValidator, ProofValidatorInput};
use std::sync::Arc;
use tracing::warn;
use wopi_protocol::WopiRequest;

/// A pre-dispatch check on a request.
pub trait RequestGuard: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Admits or rejects the request.
    fn check(&self, request: &WopiRequest) -> EngineResult<()>;
}

/// Rejects requests without a non-empty `access_token`.
#[derive(Debug, Clone, Default)]
pub struct AccessTokenGuard;

impl RequestGuard for AccessTokenGuard {
    fn name(&self) -> &'static str {
        "access_token"
    }

    fn check(&self, request: &WopiRequest) -> EngineResult<()> {
        match request.access_token() {
            Some(_) => Ok(()),
            None => Err(EngineError::Unauthenticated("missing access token".into())),
        }
    }
}

/// Verifies proof headers when the policy enables proof validation.
pub struct ProofGuard {
    validator: ProofValidator,
    policy: Arc<dyn FeaturePolicy>,
}

impl ProofGuard {
    /// Creates a guard.
    pub fn new(validator: ProofValidator, policy: Arc<dyn FeaturePolicy>) -> Self {
        Self { validator, policy }
    }
}

impl RequestGuard for ProofGuard {
    fn name(&self) -> &'static str {
        "proof"
    }

    fn check(&self, request: &WopiRequest) -> EngineResult<()> {
        if !self.policy.proof_validation_enabled() {
            return Ok(());
        }
        let input = ProofValidatorInput::from_request(request);
        self.validator.validate(&input).map_err(|failure| {
            warn!(file_id = %request.file_id, %failure, "proof rejected");
            match failure {
                // Keys could not be obtained; the client may retry.
                ProofFailure::Keys(DiscoveryError::Fetch(msg) | DiscoveryError::Parse(msg)) => {
                    EngineError::Transient(msg)
                }
                other => EngineError::Unauthenticated(other.to_string()),
            }
        })
    }
}

/// Ordered guards; the first rejection wins.
#[derive(Default)]
pub struct GuardChain {
    guards: Vec<Box<dyn RequestGuard>>,
}

impl GuardChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a guard.
    pub fn with(mut self, guard: impl RequestGuard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    /// Appends a boxed guard.
    pub fn push(&mut self, guard: Box<dyn RequestGuard>) {
        self.guards.push(guard);
    }

    /// Guard names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.guards.iter().map(|g| g.name()).collect()
    }

    /// Runs every guard.
    pub fn check(&self, request: &WopiRequest) -> EngineResult<()> {
        self.guards.iter().try_for_each(|guard| guard.check(request))
    }
}
