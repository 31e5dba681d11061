//! Discovery document handling.
//!
//! The editing client publishes an XML manifest listing, per application, the
//! actions it offers for each file extension and the public proof keys it
//! signs requests with. This module parses that manifest, caches it
//! process-wide, and expands action URL templates.

mod action;
mod cache;
mod document;
mod fetch;

pub use action::ActionUrlBuilder;
pub use cache::DiscoveryCache;
pub use document::{DiscoveryAction, DiscoveryApp, DiscoveryDocument, ProofKey, ProofKeys};
#[cfg(feature = "http")]
pub use fetch::UreqFetcher;
pub use fetch::{DiscoveryFetcher, FileFetcher, StaticFetcher};

use thiserror::Error;

/// Errors raised while obtaining or querying the discovery document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The manifest could not be retrieved.
    #[error("discovery fetch failed: {0}")]
    Fetch(String),

    /// The manifest is not valid discovery XML.
    #[error("discovery parse failed: {0}")]
    Parse(String),

    /// No action with this name exists for the extension.
    #[error("action {action:?} is not supported for extension {extension:?}")]
    UnsupportedAction {
        /// Requested extension.
        extension: String,
        /// Requested action name.
        action: String,
    },

    /// The manifest carries no proof keys.
    #[error("discovery document has no proof keys")]
    NoProofKeys,
}
