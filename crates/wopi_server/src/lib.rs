//! # WOPI Server
//!
//! Protocol engine for a WOPI host.
//!
//! This crate provides:
//! - Discovery document parsing and a process-wide cache with single-flight refresh
//! - Proof validation against current and previous proof keys
//! - The per-file lock state machine over a compare-and-set repository primitive
//! - CheckFileInfo capability negotiation from an ordered probe table
//! - The protocol engine that authenticates, dispatches and maps errors to responses
//!
//! # Architecture
//!
//! The engine owns no storage. Files, locks and user info live behind the
//! [`DocumentRepository`] trait; subjects behind [`UserContext`]; optional
//! features behind [`FeaturePolicy`]. Every collaborator is injected at
//! construction:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wopi_server::{MemoryRepository, PolicyConfig, ProtocolEngine};
//!
//! let repository = Arc::new(MemoryRepository::new());
//! let engine = ProtocolEngine::builder(repository, Arc::new(PolicyConfig::default()))
//!     .build()?;
//! let response = engine.handle(&request);
//! ```
//!
//! # Locking
//!
//! A file has at most one active lock. Expired locks are treated as absent on
//! the next access; nothing sweeps them. The exclusion boundary is the
//! repository's compare-and-set on the lock field, so two hosts sharing a
//! repository cannot both win the same lock.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod capability;
mod clock;
mod config;
pub mod discovery;
mod engine;
mod error;
mod guard;
mod lock;
mod memory;
mod policy;
mod proof;
mod repository;
mod server;
mod user;

pub use auth::{IssuedToken, SignedTokenAuthority, TokenClaims, TokenConfig};
pub use capability::{CapabilityResolver, CapabilitySet, Probe, ProbeContext, PropertyValue, PROBES};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, PolicyConfig, ServerConfig};
pub use discovery::{
    ActionUrlBuilder, DiscoveryAction, DiscoveryApp, DiscoveryCache, DiscoveryDocument,
    DiscoveryError, DiscoveryFetcher, FileFetcher, ProofKey, ProofKeys, StaticFetcher,
};
#[cfg(feature = "http")]
pub use discovery::UreqFetcher;
pub use engine::{Admitted, EngineBuilder, FileContent, ProtocolEngine};
pub use error::{EngineError, EngineResult};
pub use guard::{AccessTokenGuard, GuardChain, ProofGuard, RequestGuard};
pub use lock::{LockError, LockManager, LockState};
pub use memory::MemoryRepository;
pub use policy::{FeaturePolicy, FileUrls, Restrictions, UnlockedPutPolicy};
pub use proof::{ProofFailure, ProofValidator, ProofValidatorInput};
pub use repository::{
    CasOutcome, DocumentRepository, FileHandle, LockRecord, NewDocument, RepositoryError,
    RepositoryResult, WriteGuard,
};
pub use server::{HostPage, WopiServer};
pub use user::{AccessGrant, DefaultUserContext, UserContext};
