//! Assembled test host.
//!
//! [`TestHost`] wires a [`WopiServer`] over an in-memory repository, a manual
//! clock and a discovery document carrying the shared proof keys, and offers
//! one-line helpers for the common requests.

use crate::discovery::DiscoveryBuilder;
use crate::keys::ProofKeyPair;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use wopi_protocol::{
    Operation, Timestamp, WopiRequest, WopiResponse, HEADER_LOCK, HEADER_OLD_LOCK,
    HEADER_OVERRIDE, HEADER_PROOF, HEADER_PROOF_OLD, HEADER_TIMESTAMP,
};
use wopi_server::{
    Clock, DiscoveryError, DiscoveryFetcher, FileHandle, ManualClock, MemoryRepository, PolicyConfig,
    ServerConfig, StaticFetcher, WopiServer,
};

/// Public base URL of the test host.
pub const TEST_HOST_URL: &str = "https://host.example";
/// Discovery URL of the test client.
pub const TEST_DISCOVERY_URL: &str = "https://office.example/hosting/discovery";
/// Access token sent by the request helpers.
pub const TEST_ACCESS_TOKEN: &str = "test-token";

/// Instant the test clock starts at.
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
        .single()
        .expect("valid test epoch")
}

/// Lets the host keep a handle on a fetcher the server owns.
pub struct SharedFetcher(pub Arc<StaticFetcher>);

impl DiscoveryFetcher for SharedFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<String, DiscoveryError> {
        self.0.fetch(url, timeout)
    }
}

/// A fully wired host for integration tests.
pub struct TestHost {
    /// The server under test.
    pub server: WopiServer,
    /// Backing repository.
    pub repository: Arc<MemoryRepository>,
    /// Clock shared by server and repository.
    pub clock: Arc<ManualClock>,
    /// Discovery transport; swap documents or inject failures here.
    pub fetcher: Arc<StaticFetcher>,
}

impl TestHost {
    /// Host with the default policy.
    pub fn new() -> Self {
        Self::with_policy(PolicyConfig::default())
    }

    /// Host with a custom policy.
    pub fn with_policy(policy: PolicyConfig) -> Self {
        Self::with_config(
            ServerConfig::new(policy)
                .with_discovery_url(TEST_DISCOVERY_URL)
                .with_server_url(TEST_HOST_URL),
        )
    }

    /// Host with a custom configuration.
    pub fn with_config(config: ServerConfig) -> Self {
        let clock = Arc::new(ManualClock::new(test_epoch()));
        let repository = Arc::new(MemoryRepository::with_clock(clock.clone()));
        let fetcher = Arc::new(StaticFetcher::new(
            DiscoveryBuilder::office_defaults()
                .with_proof_keys(ProofKeyPair::current(), Some(ProofKeyPair::previous()))
                .build(),
        ));
        let server = WopiServer::with_clock(
            config,
            repository.clone(),
            Box::new(SharedFetcher(fetcher.clone())),
            clock.clone(),
        )
        .expect("Failed to build test host");

        Self {
            server,
            repository,
            clock,
            fetcher,
        }
    }

    /// Stores a file.
    pub fn insert(&self, id: &str, name: &str, content: Vec<u8>) -> FileHandle {
        self.repository.insert(id, name, "owner-1", content)
    }

    /// Absolute URL of the endpoint `operation` addresses.
    pub fn url(&self, operation: Operation, file_id: &str) -> String {
        let suffix = match operation {
            Operation::GetFile | Operation::PutFile => "/contents",
            _ => "",
        };
        format!("{TEST_HOST_URL}/wopi/files/{file_id}{suffix}?access_token={TEST_ACCESS_TOKEN}")
    }

    /// A request carrying the test token and URL.
    pub fn request(&self, operation: Operation, file_id: &str) -> WopiRequest {
        let request = WopiRequest::new(operation, file_id)
            .with_access_token(TEST_ACCESS_TOKEN)
            .with_url(self.url(operation, file_id));
        match operation.override_keyword() {
            Some(keyword) => request.with_header(HEADER_OVERRIDE, keyword),
            None => request,
        }
    }

    /// Adds proof headers signed by `key` at the current test time.
    pub fn sign(&self, request: WopiRequest, key: &ProofKeyPair) -> WopiRequest {
        let timestamp = Timestamp::from_datetime(self.clock.now());
        self.sign_at(request, key, timestamp)
    }

    /// Adds proof headers signed by `key` at `timestamp`.
    pub fn sign_at(&self, request: WopiRequest, key: &ProofKeyPair, timestamp: Timestamp) -> WopiRequest {
        let token = request.access_token().unwrap_or_default().to_string();
        let proof = key.sign_request(&token, &request.url, timestamp);
        request
            .with_header(HEADER_TIMESTAMP, timestamp.to_string())
            .with_header(HEADER_PROOF, proof)
    }

    /// Adds an `X-WOPI-ProofOld` header signed by `key`.
    pub fn sign_old(&self, request: WopiRequest, key: &ProofKeyPair) -> WopiRequest {
        let timestamp = Timestamp::from_datetime(self.clock.now());
        let token = request.access_token().unwrap_or_default().to_string();
        let proof = key.sign_request(&token, &request.url, timestamp);
        request.with_header(HEADER_PROOF_OLD, proof)
    }

    /// Sends a request through the engine.
    pub fn send(&self, request: &WopiRequest) -> WopiResponse {
        self.server.engine().handle(request)
    }

    /// CheckFileInfo.
    pub fn check_file_info(&self, file_id: &str) -> WopiResponse {
        self.send(&self.request(Operation::CheckFileInfo, file_id))
    }

    /// GetFile.
    pub fn get_file(&self, file_id: &str) -> WopiResponse {
        self.send(&self.request(Operation::GetFile, file_id))
    }

    /// PutFile, with a lock header when `lock` is given.
    pub fn put_file(&self, file_id: &str, body: &[u8], lock: Option<&str>) -> WopiResponse {
        let request = self.request(Operation::PutFile, file_id).with_body(body.to_vec());
        match lock {
            Some(lock) => self.send(&request.with_header(HEADER_LOCK, lock)),
            None => self.send(&request),
        }
    }

    /// Lock.
    pub fn lock(&self, file_id: &str, lock: &str) -> WopiResponse {
        self.send(&self.request(Operation::Lock, file_id).with_lock(lock))
    }

    /// Lock with `X-WOPI-OldLock`.
    pub fn relock(&self, file_id: &str, old: &str, new: &str) -> WopiResponse {
        let request = self
            .request(Operation::Lock, file_id)
            .with_lock(new)
            .with_header(HEADER_OLD_LOCK, old);
        self.send(&request)
    }

    /// Unlock.
    pub fn unlock(&self, file_id: &str, lock: &str) -> WopiResponse {
        self.send(&self.request(Operation::Unlock, file_id).with_lock(lock))
    }

    /// RefreshLock.
    pub fn refresh_lock(&self, file_id: &str, lock: &str) -> WopiResponse {
        self.send(&self.request(Operation::RefreshLock, file_id).with_lock(lock))
    }

    /// GetLock.
    pub fn get_lock(&self, file_id: &str) -> WopiResponse {
        self.send(&self.request(Operation::GetLock, file_id))
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}
