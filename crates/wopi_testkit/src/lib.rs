//! # WOPI Testkit
//!
//! Test utilities for the WOPI host engine.
//!
//! This crate provides:
//! - Deterministic RSA proof key pairs and request signing
//! - A discovery document builder
//! - [`TestHost`], a fully wired host over an in-memory repository
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wopi_testkit::prelude::*;
//!
//! #[test]
//! fn lock_then_put() {
//!     let host = TestHost::new();
//!     host.insert("doc-1", "Plan.docx", Vec::new());
//!     assert_eq!(host.lock("doc-1", "abc").status, 200);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod discovery;
pub mod fixtures;
pub mod generators;
pub mod keys;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::discovery::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::keys::*;
}

pub use discovery::*;
pub use fixtures::*;
pub use generators::*;
pub use keys::*;
