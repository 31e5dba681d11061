//! # WOPI Protocol
//!
//! Wire protocol types for a WOPI host.
//!
//! This crate provides:
//! - `Operation` routing from method, path and `X-WOPI-Override`
//! - `WopiRequest` decoding with case-insensitive `Headers`
//! - `LockToken` validation (256 or 1024 ASCII characters)
//! - `ProofMessage` construction for proof-key validation
//! - `Timestamp` conversion between .NET ticks and UTC instants
//! - `WopiResponse` and the `ErrorKind` to status mapping
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod headers;
mod lock;
mod operation;
mod proof;
mod request;
mod response;

pub use error::{ErrorKind, ProtocolError, ProtocolResult};
pub use headers::{
    Headers, ACCESS_TOKEN_PARAM, HEADER_INVALID_FILE_NAME_ERROR, HEADER_ITEM_VERSION, HEADER_LOCK,
    HEADER_LOCK_FAILURE_REASON, HEADER_OLD_LOCK, HEADER_OVERRIDE, HEADER_PROOF, HEADER_PROOF_OLD,
    HEADER_REQUESTED_NAME, HEADER_TIMESTAMP,
};
pub use lock::{LockToken, LockTokenError, EXTENDED_LOCK_LENGTH, STANDARD_LOCK_LENGTH};
pub use operation::{Method, Operation, Resource};
pub use proof::{ProofMessage, Timestamp};
pub use request::WopiRequest;
pub use response::{ResponseBody, WopiResponse};
