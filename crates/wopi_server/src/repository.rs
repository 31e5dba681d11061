//! Document repository capability.
//!
//! The engine never stores anything itself. Every read and mutation goes
//! through [`DocumentRepository`]; an adapter implements the operations its
//! backend supports and inherits `Unsupported` defaults for the rest.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors a repository adapter reports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No document with this id.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Another document already uses the requested name.
    #[error("name already in use: {0}")]
    NameConflict(String),

    /// The requested name is not acceptable to the backend.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The adapter does not implement this operation.
    #[error("operation not supported by repository: {0}")]
    Unsupported(&'static str),

    /// The [`WriteGuard`] no longer matches stored state.
    #[error("precondition failed for {id}")]
    PreconditionFailed {
        /// Document id.
        id: String,
        /// Active lock at the time of the failed write, if any.
        current_lock: Option<String>,
    },

    /// The backend did not answer within its deadline.
    #[error("repository timed out: {0}")]
    Timeout(String),

    /// The backend is temporarily unreachable.
    #[error("repository unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure.
    #[error("repository backend error: {0}")]
    Backend(String),
}

impl RepositoryError {
    /// Returns true if the failure is worth retrying by the caller.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Timeout(_) | RepositoryError::Unavailable(_))
    }
}

/// A lock as persisted alongside a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Lock token.
    pub token: String,
    /// Instant after which the lock is treated as released.
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    /// Creates a lock record.
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Returns true if the lock has not yet expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Document attributes the engine consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Document id.
    pub id: String,
    /// Display name including extension.
    pub name: String,
    /// Content length in bytes.
    pub size: u64,
    /// Opaque version; changes whenever content changes.
    pub version: String,
    /// Owner's user id.
    pub owner_id: String,
    /// Extension without the leading dot, if stored separately from the name.
    pub extension: Option<String>,
    /// Base64 SHA-256 of the content.
    pub sha256: Option<String>,
    /// Last content modification.
    pub last_modified: Option<DateTime<Utc>>,
    /// Stored lock, possibly expired.
    pub lock: Option<LockRecord>,
}

impl FileHandle {
    /// Creates a handle with the required attributes.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        owner_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: 0,
            version: version.into(),
            owner_id: owner_id.into(),
            extension: None,
            sha256: None,
            last_modified: None,
            lock: None,
        }
    }

    /// Lower-case extension without dot, from the stored field or the name.
    pub fn extension(&self) -> Option<String> {
        let raw = match &self.extension {
            Some(ext) => ext.as_str(),
            None => self.name.rsplit_once('.').map(|(_, ext)| ext)?,
        };
        let ext = raw.trim_start_matches('.');
        (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
    }

    /// Name without its extension.
    pub fn stem(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.name,
        }
    }

    /// The stored lock if it is still active.
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<&LockRecord> {
        self.lock.as_ref().filter(|lock| lock.is_active(now))
    }
}

/// Snapshot a mutation was authorized against.
///
/// The repository applies the mutation only if the stored version still
/// equals the snapshot and the token of the lock active at apply time is the
/// one observed here, and reports [`RepositoryError::PreconditionFailed`]
/// otherwise. Expiry is not compared, so a refresh by the holder does not
/// invalidate the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteGuard {
    /// Version observed when the mutation was authorized.
    pub version: String,
    /// Token of the lock active when the mutation was authorized.
    pub lock_token: Option<String>,
}

impl WriteGuard {
    /// Captures the guard for a handle at `now`.
    pub fn snapshot(file: &FileHandle, now: DateTime<Utc>) -> Self {
        Self {
            version: file.version.clone(),
            lock_token: file.active_lock(now).map(|lock| lock.token.clone()),
        }
    }

    /// Returns true if `file` at `now` still satisfies the guard.
    pub fn holds_for(&self, file: &FileHandle, now: DateTime<Utc>) -> bool {
        file.version == self.version
            && file.active_lock(now).map(|lock| lock.token.as_str()) == self.lock_token.as_deref()
    }
}

/// Outcome of a lock compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored lock matched and was replaced.
    Applied,
    /// The stored lock differed; carries what is stored now.
    Conflict(Option<LockRecord>),
}

/// Properties for a new document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    /// Display name including extension.
    pub name: String,
    /// Owner's user id.
    pub owner_id: String,
    /// Initial content.
    pub content: Vec<u8>,
}

/// Storage capability consumed by the engine.
///
/// Only [`find`](DocumentRepository::find) is mandatory. Calls are expected
/// to enforce their own deadlines and report [`RepositoryError::Timeout`]
/// instead of blocking indefinitely.
pub trait DocumentRepository: Send + Sync {
    /// Looks up a document by id.
    fn find(&self, id: &str) -> RepositoryResult<Option<FileHandle>>;

    /// Looks up a document by display name.
    fn find_by_name(&self, _name: &str) -> RepositoryResult<Option<FileHandle>> {
        Err(RepositoryError::Unsupported("find_by_name"))
    }

    /// Creates a document.
    fn create(&self, _document: NewDocument) -> RepositoryResult<FileHandle> {
        Err(RepositoryError::Unsupported("create"))
    }

    /// Reads the full content.
    fn content(&self, _id: &str) -> RepositoryResult<Vec<u8>> {
        Err(RepositoryError::Unsupported("content"))
    }

    /// Replaces the content and bumps the version, atomically.
    ///
    /// Returns the new version. Either the whole content is persisted with the
    /// new version, or nothing changes.
    fn put_content(
        &self,
        _id: &str,
        _content: &[u8],
        _guard: &WriteGuard,
    ) -> RepositoryResult<String> {
        Err(RepositoryError::Unsupported("put_content"))
    }

    /// Replaces the stored lock if it still equals `expected`.
    fn compare_and_set_lock(
        &self,
        _id: &str,
        _expected: Option<&LockRecord>,
        _replacement: Option<LockRecord>,
    ) -> RepositoryResult<CasOutcome> {
        Err(RepositoryError::Unsupported("compare_and_set_lock"))
    }

    /// Renames the document, keeping its extension. Returns the new stem.
    fn rename(&self, _id: &str, _name: &str, _guard: &WriteGuard) -> RepositoryResult<String> {
        Err(RepositoryError::Unsupported("rename"))
    }

    /// Deletes the document.
    fn delete(&self, _id: &str, _guard: &WriteGuard) -> RepositoryResult<()> {
        Err(RepositoryError::Unsupported("delete"))
    }

    /// Reads stored user info.
    fn user_info(&self, _user_id: &str) -> RepositoryResult<Option<String>> {
        Ok(None)
    }

    /// Stores user info.
    fn set_user_info(&self, _user_id: &str, _info: &str) -> RepositoryResult<()> {
        Err(RepositoryError::Unsupported("set_user_info"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct FindOnly;

    impl DocumentRepository for FindOnly {
        fn find(&self, _id: &str) -> RepositoryResult<Option<FileHandle>> {
            Ok(None)
        }
    }

    #[test]
    fn defaults_are_unsupported() {
        let repo = FindOnly;
        let guard = WriteGuard {
            version: "1".into(),
            lock_token: None,
        };
        assert_eq!(
            repo.put_content("a", b"x", &guard),
            Err(RepositoryError::Unsupported("put_content"))
        );
        assert!(matches!(repo.delete("a", &guard), Err(RepositoryError::Unsupported(_))));
        assert_eq!(repo.user_info("u"), Ok(None));
    }

    #[test]
    fn extension_from_name_or_field() {
        let mut file = FileHandle::new("1", "Report.DOCX", "owner", "v1");
        assert_eq!(file.extension().as_deref(), Some("docx"));
        assert_eq!(file.stem(), "Report");

        file.extension = Some(".xlsx".into());
        assert_eq!(file.extension().as_deref(), Some("xlsx"));

        let bare = FileHandle::new("2", "README", "owner", "v1");
        assert_eq!(bare.extension(), None);
        assert_eq!(bare.stem(), "README");
    }

    #[test]
    fn expired_lock_is_inactive() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut file = FileHandle::new("1", "a.docx", "o", "v");
        file.lock = Some(LockRecord::new("L", now - chrono::Duration::seconds(1)));
        assert!(file.active_lock(now).is_none());

        file.lock = Some(LockRecord::new("L", now + chrono::Duration::minutes(1)));
        assert_eq!(file.active_lock(now).map(|l| l.token.as_str()), Some("L"));
    }

    #[test]
    fn transient_classification() {
        assert!(RepositoryError::Timeout("db".into()).is_transient());
        assert!(RepositoryError::Unavailable("db".into()).is_transient());
        assert!(!RepositoryError::NotFound("x".into()).is_transient());
    }
}
