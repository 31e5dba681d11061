//! Per-file lock state machine.
//!
//! State lives in the repository's lock field. Every transition reads the
//! file, decides from the observed state, and commits through
//! [`DocumentRepository::compare_and_set_lock`]; if the field changed in the
//! meantime the transition is re-evaluated, a bounded number of times.
//! Expired locks are observed as [`LockState::Unlocked`].

use crate::clock::Clock;
use crate::policy::UnlockedPutPolicy;
use crate::repository::{
    CasOutcome, DocumentRepository, FileHandle, LockRecord, RepositoryError, WriteGuard,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use wopi_protocol::LockToken;

const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Observed lock state of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    /// No active lock.
    Unlocked,
    /// Active lock.
    Locked {
        /// Lock token.
        token: String,
        /// Expiry instant.
        expires_at: DateTime<Utc>,
    },
}

impl LockState {
    /// Interprets a stored record at `now`.
    pub fn observe(record: Option<&LockRecord>, now: DateTime<Utc>) -> Self {
        match record {
            Some(lock) if lock.is_active(now) => LockState::Locked {
                token: lock.token.clone(),
                expires_at: lock.expires_at,
            },
            _ => LockState::Unlocked,
        }
    }

    /// Current token, empty when unlocked.
    pub fn token(&self) -> &str {
        match self {
            LockState::Unlocked => "",
            LockState::Locked { token, .. } => token,
        }
    }

    /// Returns true if locked.
    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked { .. })
    }

    fn held_by(&self, token: &str) -> bool {
        matches!(self, LockState::Locked { token: held, .. } if held == token)
    }
}

/// Lock transition failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Presented token does not match the current state.
    #[error("lock mismatch on {file_id} (current {current:?}): {reason}")]
    Mismatch {
        /// File id.
        file_id: String,
        /// Current token, empty when unlocked.
        current: String,
        /// Human-readable reason.
        reason: &'static str,
    },

    /// Unlocked file may not be overwritten.
    #[error("conflicting change on {file_id}: {reason}")]
    ConflictingChange {
        /// File id.
        file_id: String,
        /// Human-readable reason.
        reason: &'static str,
    },

    /// The lock field kept changing under concurrent writers.
    #[error("lock still contended after {attempts} attempts")]
    Contended {
        /// Attempts made.
        attempts: u32,
    },

    /// Repository failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of evaluating one transition against an observed state.
enum Step {
    /// Nothing to write.
    Keep,
    /// Replace the stored lock.
    Write(Option<LockRecord>),
}

/// Applies lock transitions through a repository.
pub struct LockManager {
    repository: Arc<dyn DocumentRepository>,
    clock: Arc<dyn Clock>,
    duration: chrono::Duration,
    max_attempts: u32,
}

impl LockManager {
    /// Creates a manager granting locks for `duration`.
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        clock: Arc<dyn Clock>,
        duration: Duration,
    ) -> Self {
        Self {
            repository,
            clock,
            duration: chrono::Duration::from_std(duration)
                .unwrap_or_else(|_| chrono::Duration::minutes(30)),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets how often a contended transition is re-evaluated.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Acquires the lock, or refreshes it if `token` already holds it.
    pub fn lock(&self, file_id: &str, token: &LockToken) -> Result<LockState, LockError> {
        let token = token.as_str();
        self.transition(file_id, "lock", |state, now| match state {
            LockState::Unlocked => Ok(Step::Write(Some(self.record(token, now)))),
            held if held.held_by(token) => Ok(Step::Write(Some(self.record(token, now)))),
            held => Err(mismatch(file_id, held, "file is locked by another client")),
        })
    }

    /// Swaps the lock from `old` to `new`.
    pub fn unlock_and_relock(
        &self,
        file_id: &str,
        old: &LockToken,
        new: &LockToken,
    ) -> Result<LockState, LockError> {
        self.transition(file_id, "unlock_and_relock", |state, now| {
            if state.held_by(old.as_str()) {
                Ok(Step::Write(Some(self.record(new.as_str(), now))))
            } else {
                Err(mismatch(file_id, state, "old lock does not match current lock"))
            }
        })
    }

    /// Releases the lock held by `token`.
    pub fn unlock(&self, file_id: &str, token: &LockToken) -> Result<LockState, LockError> {
        self.transition(file_id, "unlock", |state, _| {
            if state.held_by(token.as_str()) {
                Ok(Step::Write(None))
            } else {
                Err(mismatch(file_id, state, unheld_reason(state)))
            }
        })
    }

    /// Extends the lock held by `token`.
    pub fn refresh(&self, file_id: &str, token: &LockToken) -> Result<LockState, LockError> {
        self.transition(file_id, "refresh", |state, now| {
            if state.held_by(token.as_str()) {
                Ok(Step::Write(Some(self.record(token.as_str(), now))))
            } else {
                Err(mismatch(file_id, state, unheld_reason(state)))
            }
        })
    }

    /// Reads the current state.
    pub fn get_lock(&self, file_id: &str) -> Result<LockState, LockError> {
        self.transition(file_id, "get_lock", |_, _| Ok(Step::Keep))
    }

    /// Authorizes a content write.
    ///
    /// A locked file requires the matching token. An unlocked file is
    /// writable only if `unlocked` permits its current size.
    pub fn write_guard(
        &self,
        file: &FileHandle,
        presented: Option<&LockToken>,
        unlocked: UnlockedPutPolicy,
    ) -> Result<WriteGuard, LockError> {
        let now = self.clock.now();
        let state = LockState::observe(file.lock.as_ref(), now);
        match (&state, presented) {
            (LockState::Locked { .. }, Some(token)) if state.held_by(token.as_str()) => {
                Ok(WriteGuard::snapshot(file, now))
            }
            (LockState::Locked { .. }, _) => {
                warn!(file_id = %file.id, "write rejected: lock mismatch");
                Err(mismatch(&file.id, &state, "file is locked by another client"))
            }
            (LockState::Unlocked, _) if unlocked.permits(file.size) => {
                Ok(WriteGuard::snapshot(file, now))
            }
            (LockState::Unlocked, _) => {
                warn!(file_id = %file.id, size = file.size, "write rejected: file not locked");
                Err(LockError::ConflictingChange {
                    file_id: file.id.clone(),
                    reason: "file is not locked",
                })
            }
        }
    }

    /// Authorizes a metadata mutation such as rename or delete.
    ///
    /// A locked file requires the matching token; an unlocked file is always
    /// allowed.
    pub fn mutation_guard(
        &self,
        file: &FileHandle,
        presented: Option<&LockToken>,
    ) -> Result<WriteGuard, LockError> {
        let now = self.clock.now();
        let state = LockState::observe(file.lock.as_ref(), now);
        match presented {
            _ if !state.is_locked() => Ok(WriteGuard::snapshot(file, now)),
            Some(token) if state.held_by(token.as_str()) => Ok(WriteGuard::snapshot(file, now)),
            _ => Err(mismatch(&file.id, &state, "file is locked")),
        }
    }

    fn record(&self, token: &str, now: DateTime<Utc>) -> LockRecord {
        LockRecord::new(token, now + self.duration)
    }

    fn transition<F>(&self, file_id: &str, op: &'static str, decide: F) -> Result<LockState, LockError>
    where
        F: Fn(&LockState, DateTime<Utc>) -> Result<Step, LockError>,
    {
        for attempt in 1..=self.max_attempts {
            let file = self
                .repository
                .find(file_id)?
                .ok_or_else(|| RepositoryError::NotFound(file_id.to_string()))?;
            let now = self.clock.now();
            let state = LockState::observe(file.lock.as_ref(), now);

            let replacement = match decide(&state, now) {
                Ok(Step::Keep) => return Ok(state),
                Ok(Step::Write(replacement)) => replacement,
                Err(err) => {
                    warn!(file_id, op, current = state.token(), "lock transition rejected");
                    return Err(err);
                }
            };

            match self
                .repository
                .compare_and_set_lock(file_id, file.lock.as_ref(), replacement.clone())?
            {
                CasOutcome::Applied => {
                    let next = LockState::observe(replacement.as_ref(), now);
                    debug!(file_id, op, token = next.token(), "lock transition applied");
                    return Ok(next);
                }
                CasOutcome::Conflict(_) => {
                    debug!(file_id, op, attempt, "lock changed concurrently, retrying");
                }
            }
        }
        Err(LockError::Contended {
            attempts: self.max_attempts,
        })
    }
}

fn mismatch(file_id: &str, state: &LockState, reason: &'static str) -> LockError {
    LockError::Mismatch {
        file_id: file_id.to_string(),
        current: state.token().to_string(),
        reason,
    }
}

fn unheld_reason(state: &LockState) -> &'static str {
    if state.is_locked() {
        "lock token does not match"
    } else {
        "file is not locked"
    }
}
