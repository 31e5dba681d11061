//! Feature policy consumed by the engine.
//!
//! A policy answers two kinds of question: which optional protocol features
//! the host implements, and what a given subject may see or do on a given
//! file. [`PolicyConfig`](crate::PolicyConfig) is the configuration-backed
//! implementation; hosts with per-user rules implement the trait directly.

use crate::repository::FileHandle;
use crate::user::AccessGrant;
use std::time::Duration;

/// How PutFile treats a file that carries no active lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnlockedPutPolicy {
    /// Allowed only while the stored content is empty.
    #[default]
    EmptyFileOnly,
    /// Always allowed.
    Always,
    /// Never allowed.
    Never,
}

impl UnlockedPutPolicy {
    /// Parses `empty`, `always` or `never`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "empty" | "empty-only" | "empty_file_only" => Some(Self::EmptyFileOnly),
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            _ => None,
        }
    }

    /// Returns true if an unlocked file of `size` bytes may be overwritten.
    pub fn permits(self, size: u64) -> bool {
        match self {
            Self::EmptyFileOnly => size == 0,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Per-file client restrictions reported by CheckFileInfo.
///
/// `None` omits the property from the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Restrictions {
    pub read_only: Option<bool>,
    pub user_can_not_write_relative: Option<bool>,
    pub disable_print: Option<bool>,
    pub hide_print_option: Option<bool>,
    pub disable_export: Option<bool>,
    pub hide_export_option: Option<bool>,
    pub disable_copy: Option<bool>,
}

/// Host URLs reported by CheckFileInfo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct FileUrls {
    pub close_url: Option<String>,
    pub download_url: Option<String>,
    pub file_version_url: Option<String>,
    pub file_sharing_url: Option<String>,
    pub file_url: Option<String>,
    pub supported_share_url_types: Option<Vec<String>>,
}

/// Source of feature switches and per-file permissions.
pub trait FeaturePolicy: Send + Sync {
    /// Lock, Unlock and RefreshLock.
    fn supports_locks(&self) -> bool;
    /// GetLock.
    fn supports_get_lock(&self) -> bool;
    /// Lock tokens up to 1024 characters instead of 256.
    fn supports_extended_lock_length(&self) -> bool;
    /// PutFile.
    fn supports_update(&self) -> bool;
    /// RenameFile.
    fn supports_rename(&self) -> bool;
    /// DeleteFile.
    fn supports_delete(&self) -> bool;
    /// PutUserInfo and the UserInfo property.
    fn supports_user_info(&self) -> bool;
    /// Whether proof headers are verified.
    fn proof_validation_enabled(&self) -> bool;
    /// Subject reported when a token carries no user.
    fn default_user(&self) -> &str;
    /// Default `UI_LLCC` for action URLs.
    fn ui_language(&self) -> Option<&str> {
        None
    }
    /// Lifetime granted by Lock and RefreshLock.
    fn lock_duration(&self) -> Duration;
    /// Accepted distance between the proof timestamp and now.
    fn proof_clock_skew(&self) -> Duration;
    /// Rule for PutFile without an active lock.
    fn unlocked_put(&self) -> UnlockedPutPolicy;
    /// Largest accepted PutFile body.
    fn max_put_bytes(&self) -> Option<usize> {
        None
    }
    /// Whether `grant` may modify `file`.
    fn user_can_write(&self, _file: &FileHandle, grant: &AccessGrant) -> bool {
        grant.can_write
    }
    /// Client restrictions for `file`.
    fn restrictions(&self, _file: &FileHandle, _grant: &AccessGrant) -> Restrictions {
        Restrictions::default()
    }
    /// Host URLs for `file`.
    fn file_urls(&self, _file: &FileHandle) -> FileUrls {
        FileUrls::default()
    }

    /// Maximum lock token length under this policy.
    fn lock_length_limit(&self) -> usize {
        wopi_protocol::LockToken::limit(self.supports_extended_lock_length())
    }
}
