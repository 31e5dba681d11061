//! The protocol engine.
//!
//! Every operation runs the same admission sequence before it touches any
//! file state:
//!
//! 1. the guard chain (access token, then proof when enabled)
//! 2. grant resolution through the [`UserContext`]
//! 3. file lookup through the [`DocumentRepository`]
//!
//! Policy gating and header contracts are checked after admission, so an
//! unknown file id is reported as not found by every operation.

use crate::capability::{CapabilityResolver, CapabilitySet, Probe};
use crate::clock::{Clock, SystemClock};
use crate::config::ConfigError;
use crate::discovery::DiscoveryCache;
use crate::error::{EngineError, EngineResult};
use crate::guard::{AccessTokenGuard, GuardChain, ProofGuard, RequestGuard};
use crate::lock::{LockManager, LockState};
use crate::policy::FeaturePolicy;
use crate::proof::ProofValidator;
use crate::repository::{DocumentRepository, FileHandle};
use crate::user::{AccessGrant, DefaultUserContext, UserContext};
use std::sync::Arc;
use tracing::{debug, error, warn};
use wopi_protocol::{
    ErrorKind, Operation, ProtocolError, WopiRequest, WopiResponse, HEADER_ITEM_VERSION,
    HEADER_LOCK,
};

/// Longest accepted PutUserInfo payload, in characters.
const MAX_USER_INFO_CHARS: usize = 1024;

/// Characters a file name may not contain.
const INVALID_NAME_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// A request that passed admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    /// Resolved subject.
    pub grant: AccessGrant,
    /// Resolved file.
    pub file: FileHandle,
}

/// GetFile result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// File bytes.
    pub bytes: Vec<u8>,
    /// Version the bytes belong to.
    pub version: String,
}

/// Builder for [`ProtocolEngine`].
pub struct EngineBuilder {
    repository: Arc<dyn DocumentRepository>,
    policy: Arc<dyn FeaturePolicy>,
    users: Arc<dyn UserContext>,
    discovery: Option<Arc<DiscoveryCache>>,
    clock: Arc<dyn Clock>,
    host_url: Option<String>,
    guards: Vec<Box<dyn RequestGuard>>,
    probes: Vec<Probe>,
    max_lock_attempts: Option<u32>,
}

impl EngineBuilder {
    /// Sets the access token resolver. Defaults to [`DefaultUserContext`].
    pub fn with_users(mut self, users: Arc<dyn UserContext>) -> Self {
        self.users = users;
        self
    }

    /// Sets the discovery cache supplying proof keys.
    pub fn with_discovery(mut self, discovery: Arc<DiscoveryCache>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Sets the clock for lock expiry, grant expiry and proof skew.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the host's public base URL for proof URL variants.
    pub fn with_host_url(mut self, host_url: impl Into<String>) -> Self {
        self.host_url = Some(host_url.into());
        self
    }

    /// Appends a guard after the built-in ones.
    pub fn with_guard(mut self, guard: impl RequestGuard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    /// Appends a CheckFileInfo property after the standard ones.
    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probes.push(probe);
        self
    }

    /// Sets how often a contended lock transition is retried.
    pub fn with_max_lock_attempts(mut self, attempts: u32) -> Self {
        self.max_lock_attempts = Some(attempts);
        self
    }

    /// Builds the engine.
    ///
    /// Fails if proof validation is enabled without a discovery cache.
    pub fn build(self) -> Result<ProtocolEngine, ConfigError> {
        if self.policy.proof_validation_enabled() && self.discovery.is_none() {
            return Err(ConfigError::MissingDiscovery);
        }

        let mut guards = GuardChain::new().with(AccessTokenGuard);
        if let Some(discovery) = self.discovery {
            let mut validator = ProofValidator::new(discovery, self.policy.proof_clock_skew())
                .with_clock(self.clock.clone());
            if let Some(host_url) = self.host_url {
                validator = validator.with_host_url(host_url);
            }
            guards = guards.with(ProofGuard::new(validator, self.policy.clone()));
        }
        for guard in self.guards {
            guards.push(guard);
        }

        let mut locks = LockManager::new(
            self.repository.clone(),
            self.clock.clone(),
            self.policy.lock_duration(),
        );
        if let Some(attempts) = self.max_lock_attempts {
            locks = locks.with_max_attempts(attempts);
        }

        let capabilities = self
            .probes
            .into_iter()
            .fold(CapabilityResolver::new(self.policy.clone()), CapabilityResolver::with_probe);

        Ok(ProtocolEngine {
            repository: self.repository,
            policy: self.policy,
            users: self.users,
            guards,
            locks,
            capabilities,
            clock: self.clock,
        })
    }
}

/// Authenticates, dispatches and answers WOPI requests.
///
/// Holds no file state of its own; everything durable lives in the
/// repository.
pub struct ProtocolEngine {
    repository: Arc<dyn DocumentRepository>,
    policy: Arc<dyn FeaturePolicy>,
    users: Arc<dyn UserContext>,
    guards: GuardChain,
    locks: LockManager,
    capabilities: CapabilityResolver,
    clock: Arc<dyn Clock>,
}

impl ProtocolEngine {
    /// Starts building an engine over a repository and policy.
    pub fn builder(
        repository: Arc<dyn DocumentRepository>,
        policy: Arc<dyn FeaturePolicy>,
    ) -> EngineBuilder {
        EngineBuilder {
            repository,
            policy,
            users: Arc::new(DefaultUserContext),
            discovery: None,
            clock: Arc::new(SystemClock),
            host_url: None,
            guards: Vec::new(),
            probes: Vec::new(),
            max_lock_attempts: None,
        }
    }

    /// The feature policy.
    pub fn policy(&self) -> &dyn FeaturePolicy {
        self.policy.as_ref()
    }

    /// The lock manager.
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Handles a decoded request.
    pub fn handle(&self, request: &WopiRequest) -> WopiResponse {
        let operation = request.operation;
        debug!(operation = operation.name(), file_id = %request.file_id, "dispatching");

        let result = match operation {
            Operation::CheckFileInfo => self
                .check_file_info(request)
                .map(|properties| WopiResponse::json(properties.to_json())),
            Operation::GetFile => self.get_file(request).map(|content| {
                WopiResponse::bytes(content.bytes).with_header(HEADER_ITEM_VERSION, content.version)
            }),
            Operation::PutFile => self
                .put_file(request)
                .map(|version| WopiResponse::ok().with_header(HEADER_ITEM_VERSION, version)),
            Operation::Lock => self.lock(request).map(|_| WopiResponse::ok()),
            Operation::Unlock => self.unlock(request).map(|_| WopiResponse::ok()),
            Operation::RefreshLock => self.refresh_lock(request).map(|_| WopiResponse::ok()),
            Operation::GetLock => self
                .get_lock(request)
                .map(|state| WopiResponse::ok().with_header(HEADER_LOCK, state.token())),
            Operation::PutUserInfo => self.put_user_info(request).map(|()| WopiResponse::ok()),
            Operation::RenameFile => self
                .rename_file(request)
                .map(|name| WopiResponse::json(serde_json::json!({ "Name": name }))),
            Operation::DeleteFile => self.delete_file(request).map(|()| WopiResponse::ok()),
        };

        match result {
            Ok(response) => response,
            Err(err) => {
                log_failure(operation, &request.file_id, &err);
                err.into_response()
            }
        }
    }

    /// Runs the guards and resolves the grant and file.
    pub fn admit(&self, request: &WopiRequest) -> EngineResult<Admitted> {
        self.guards.check(request)?;

        let token = request
            .access_token()
            .ok_or_else(|| EngineError::Unauthenticated("missing access token".into()))?;
        let grant = self
            .users
            .resolve(token, &request.file_id)?
            .ok_or_else(|| EngineError::Unauthenticated("access token not accepted".into()))?;
        if grant.expires_at.is_some_and(|at| at <= self.clock.now()) {
            return Err(EngineError::Unauthenticated("access token expired".into()));
        }

        let file = self
            .repository
            .find(&request.file_id)?
            .ok_or_else(|| EngineError::NotFound(request.file_id.clone()))?;
        Ok(Admitted { grant, file })
    }

    /// Computes the CheckFileInfo properties.
    pub fn check_file_info(&self, request: &WopiRequest) -> EngineResult<CapabilitySet> {
        let Admitted { grant, file } = self.admit(request)?;
        let user_info = if self.policy.supports_user_info() {
            self.repository.user_info(&self.subject(&grant))?
        } else {
            None
        };
        Ok(self.capabilities.resolve(&file, &grant, user_info.as_deref()))
    }

    /// Reads the file content. Locks never block reads.
    pub fn get_file(&self, request: &WopiRequest) -> EngineResult<FileContent> {
        let Admitted { file, .. } = self.admit(request)?;
        let bytes = self.repository.content(&file.id)?;
        Ok(FileContent {
            bytes,
            version: file.version,
        })
    }

    /// Replaces the file content. Returns the new version.
    pub fn put_file(&self, request: &WopiRequest) -> EngineResult<String> {
        let Admitted { grant, file } = self.admit(request)?;
        if !self.policy.supports_update() {
            return Err(EngineError::Unsupported("PutFile"));
        }
        self.require_write(&file, &grant)?;
        if let Some(limit) = self.policy.max_put_bytes() {
            if request.body.len() > limit {
                return Err(EngineError::PayloadTooLarge {
                    size: request.body.len(),
                    limit,
                });
            }
        }

        let presented = request.lock_token(self.extended_locks())?;
        let guard = self
            .locks
            .write_guard(&file, presented.as_ref(), self.policy.unlocked_put())?;
        let version = self.repository.put_content(&file.id, &request.body, &guard)?;
        debug!(file_id = %file.id, size = request.body.len(), version = %version, "content replaced");
        Ok(version)
    }

    /// Acquires or refreshes a lock, or swaps it when `X-WOPI-OldLock` is set.
    pub fn lock(&self, request: &WopiRequest) -> EngineResult<LockState> {
        let Admitted { file, .. } = self.admit(request)?;
        self.require_locks()?;
        let extended = self.extended_locks();
        let token = request.require_lock_token(extended)?;
        let state = match request.old_lock_token(extended)? {
            Some(old) => self.locks.unlock_and_relock(&file.id, &old, &token)?,
            None => self.locks.lock(&file.id, &token)?,
        };
        Ok(state)
    }

    /// Releases a lock.
    pub fn unlock(&self, request: &WopiRequest) -> EngineResult<LockState> {
        let Admitted { file, .. } = self.admit(request)?;
        self.require_locks()?;
        let token = request.require_lock_token(self.extended_locks())?;
        Ok(self.locks.unlock(&file.id, &token)?)
    }

    /// Extends a lock.
    pub fn refresh_lock(&self, request: &WopiRequest) -> EngineResult<LockState> {
        let Admitted { file, .. } = self.admit(request)?;
        self.require_locks()?;
        let token = request.require_lock_token(self.extended_locks())?;
        Ok(self.locks.refresh(&file.id, &token)?)
    }

    /// Reads the current lock.
    pub fn get_lock(&self, request: &WopiRequest) -> EngineResult<LockState> {
        let Admitted { file, .. } = self.admit(request)?;
        self.require_locks()?;
        if !self.policy.supports_get_lock() {
            return Err(EngineError::Unsupported("GetLock"));
        }
        Ok(self.locks.get_lock(&file.id)?)
    }

    /// Stores the subject's user info.
    pub fn put_user_info(&self, request: &WopiRequest) -> EngineResult<()> {
        let Admitted { grant, .. } = self.admit(request)?;
        if !self.policy.supports_user_info() {
            return Err(EngineError::Unsupported("PutUserInfo"));
        }
        let info = std::str::from_utf8(&request.body)
            .map_err(|_| ProtocolError::InvalidBody("user info is not UTF-8".into()))?;
        if info.chars().count() > MAX_USER_INFO_CHARS {
            return Err(ProtocolError::InvalidBody(format!(
                "user info longer than {MAX_USER_INFO_CHARS} characters"
            ))
            .into());
        }
        self.repository.set_user_info(&self.subject(&grant), info)?;
        Ok(())
    }

    /// Renames the file, keeping its extension. Returns the new name without
    /// extension.
    pub fn rename_file(&self, request: &WopiRequest) -> EngineResult<String> {
        let Admitted { grant, file } = self.admit(request)?;
        if !self.policy.supports_rename() {
            return Err(EngineError::Unsupported("RenameFile"));
        }
        self.require_write(&file, &grant)?;

        let name = request.requested_name()?.trim();
        validate_name(name)?;
        let presented = request.lock_token(self.extended_locks())?;
        let guard = self.locks.mutation_guard(&file, presented.as_ref())?;
        let stem = self.repository.rename(&file.id, name, &guard)?;
        debug!(file_id = %file.id, name = %stem, "file renamed");
        Ok(stem)
    }

    /// Deletes the file. A locked file cannot be deleted.
    pub fn delete_file(&self, request: &WopiRequest) -> EngineResult<()> {
        let Admitted { grant, file } = self.admit(request)?;
        if !self.policy.supports_delete() {
            return Err(EngineError::Unsupported("DeleteFile"));
        }
        self.require_write(&file, &grant)?;

        let guard = self.locks.mutation_guard(&file, None)?;
        self.repository.delete(&file.id, &guard)?;
        debug!(file_id = %file.id, "file deleted");
        Ok(())
    }

    fn subject(&self, grant: &AccessGrant) -> String {
        grant
            .user_id
            .clone()
            .unwrap_or_else(|| self.policy.default_user().to_string())
    }

    fn extended_locks(&self) -> bool {
        self.policy.supports_extended_lock_length()
    }

    fn require_locks(&self) -> EngineResult<()> {
        if self.policy.supports_locks() {
            Ok(())
        } else {
            Err(EngineError::Unsupported("locks"))
        }
    }

    fn require_write(&self, file: &FileHandle, grant: &AccessGrant) -> EngineResult<()> {
        if self.capabilities.user_can_write(file, grant) {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!(
                "{} may not modify {}",
                self.subject(grant),
                file.id
            )))
        }
    }
}

fn validate_name(name: &str) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::InvalidName("name is empty".into()));
    }
    if let Some(c) = name
        .chars()
        .find(|c| INVALID_NAME_CHARS.contains(c) || c.is_control())
    {
        return Err(EngineError::InvalidName(format!(
            "name contains invalid character {c:?}"
        )));
    }
    Ok(())
}

fn log_failure(operation: Operation, file_id: &str, err: &EngineError) {
    let operation = operation.name();
    match err.kind() {
        ErrorKind::Internal | ErrorKind::Transient => {
            error!(operation, file_id, error = %err, "request failed");
        }
        ErrorKind::Unauthenticated
        | ErrorKind::Forbidden
        | ErrorKind::LockMismatch
        | ErrorKind::ConflictingChange => {
            warn!(operation, file_id, error = %err, "request rejected");
        }
        _ => debug!(operation, file_id, error = %err, "request rejected"),
    }
}
