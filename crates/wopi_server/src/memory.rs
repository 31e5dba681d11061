//! In-memory document repository.
//!
//! Backs tests, the CLI and single-process hosts. Every mutation checks its
//! [`WriteGuard`] under the write lock, so the compare-and-set contract holds
//! across threads.

use crate::clock::{Clock, SystemClock};
use crate::repository::{
    CasOutcome, DocumentRepository, FileHandle, LockRecord, NewDocument, RepositoryError,
    RepositoryResult, WriteGuard,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

struct StoredDocument {
    handle: FileHandle,
    content: Vec<u8>,
}

/// Thread-safe in-memory [`DocumentRepository`].
pub struct MemoryRepository {
    documents: RwLock<HashMap<String, StoredDocument>>,
    user_info: RwLock<HashMap<String, String>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRepository {
    /// Creates an empty repository using the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty repository with an explicit clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            user_info: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Stores a document under a caller-chosen id, replacing any existing one.
    pub fn insert(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        owner_id: &str,
        content: Vec<u8>,
    ) -> FileHandle {
        let id = id.into();
        let mut handle = FileHandle::new(id.clone(), name, owner_id, new_version());
        self.stamp(&mut handle, &content);
        self.documents.write().insert(
            id,
            StoredDocument {
                handle: handle.clone(),
                content,
            },
        );
        handle
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn stamp(&self, handle: &mut FileHandle, content: &[u8]) {
        handle.size = content.len() as u64;
        handle.sha256 = Some(STANDARD.encode(Sha256::digest(content)));
        handle.last_modified = Some(self.clock.now());
    }

    fn check_guard(&self, doc: &StoredDocument, guard: &WriteGuard) -> RepositoryResult<()> {
        let now = self.clock.now();
        if guard.holds_for(&doc.handle, now) {
            return Ok(());
        }
        Err(RepositoryError::PreconditionFailed {
            id: doc.handle.id.clone(),
            current_lock: doc.handle.active_lock(now).map(|l| l.token.clone()),
        })
    }

    fn name_taken(documents: &HashMap<String, StoredDocument>, name: &str, except: &str) -> bool {
        documents
            .values()
            .any(|d| d.handle.id != except && d.handle.name.eq_ignore_ascii_case(name))
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentRepository for MemoryRepository {
    fn find(&self, id: &str) -> RepositoryResult<Option<FileHandle>> {
        Ok(self.documents.read().get(id).map(|d| d.handle.clone()))
    }

    fn find_by_name(&self, name: &str) -> RepositoryResult<Option<FileHandle>> {
        Ok(self
            .documents
            .read()
            .values()
            .find(|d| d.handle.name.eq_ignore_ascii_case(name))
            .map(|d| d.handle.clone()))
    }

    fn create(&self, document: NewDocument) -> RepositoryResult<FileHandle> {
        let mut documents = self.documents.write();
        if Self::name_taken(&documents, &document.name, "") {
            return Err(RepositoryError::NameConflict(document.name));
        }
        let id = Uuid::new_v4().to_string();
        let mut handle = FileHandle::new(id.clone(), document.name, &document.owner_id, new_version());
        self.stamp(&mut handle, &document.content);
        documents.insert(
            id,
            StoredDocument {
                handle: handle.clone(),
                content: document.content,
            },
        );
        Ok(handle)
    }

    fn content(&self, id: &str) -> RepositoryResult<Vec<u8>> {
        self.documents
            .read()
            .get(id)
            .map(|d| d.content.clone())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn put_content(&self, id: &str, content: &[u8], guard: &WriteGuard) -> RepositoryResult<String> {
        let mut documents = self.documents.write();
        let doc = documents
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        self.check_guard(doc, guard)?;

        let version = new_version();
        doc.content = content.to_vec();
        doc.handle.version = version.clone();
        self.stamp(&mut doc.handle, content);
        Ok(version)
    }

    fn compare_and_set_lock(
        &self,
        id: &str,
        expected: Option<&LockRecord>,
        replacement: Option<LockRecord>,
    ) -> RepositoryResult<CasOutcome> {
        let mut documents = self.documents.write();
        let doc = documents
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if doc.handle.lock.as_ref() != expected {
            return Ok(CasOutcome::Conflict(doc.handle.lock.clone()));
        }
        doc.handle.lock = replacement;
        Ok(CasOutcome::Applied)
    }

    fn rename(&self, id: &str, name: &str, guard: &WriteGuard) -> RepositoryResult<String> {
        let mut documents = self.documents.write();
        let (target, stem) = {
            let doc = documents
                .get(id)
                .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
            self.check_guard(doc, guard)?;
            let target = match doc.handle.extension() {
                Some(ext) => format!("{name}.{ext}"),
                None => name.to_string(),
            };
            (target, name.to_string())
        };
        if Self::name_taken(&documents, &target, id) {
            return Err(RepositoryError::NameConflict(target));
        }
        if let Some(doc) = documents.get_mut(id) {
            doc.handle.name = target;
        }
        Ok(stem)
    }

    fn delete(&self, id: &str, guard: &WriteGuard) -> RepositoryResult<()> {
        let mut documents = self.documents.write();
        let doc = documents
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        self.check_guard(doc, guard)?;
        documents.remove(id);
        Ok(())
    }

    fn user_info(&self, user_id: &str) -> RepositoryResult<Option<String>> {
        Ok(self.user_info.read().get(user_id).cloned())
    }

    fn set_user_info(&self, user_id: &str, info: &str) -> RepositoryResult<()> {
        self.user_info
            .write()
            .insert(user_id.to_string(), info.to_string());
        Ok(())
    }
}

fn new_version() -> String {
    Uuid::new_v4().simple().to_string()
}
