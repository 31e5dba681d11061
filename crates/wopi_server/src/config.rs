//! Host configuration.

use crate::policy::{FeaturePolicy, FileUrls, Restrictions, UnlockedPutPolicy};
use crate::repository::FileHandle;
use crate::user::AccessGrant;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while building configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue {
        /// Variable name.
        name: String,
        /// Raw value.
        value: String,
    },

    /// Proof validation was enabled without a discovery source for keys.
    #[error("proof validation requires a discovery cache")]
    MissingDiscovery,
}

/// Configuration-backed [`FeaturePolicy`].
///
/// URL templates may contain `{id}`, replaced by the file id.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Lock, Unlock and RefreshLock.
    pub support_locks: bool,
    /// GetLock.
    pub support_get_lock: bool,
    /// 1024-character lock tokens.
    pub support_extended_lock_length: bool,
    /// PutFile.
    pub support_update: bool,
    /// RenameFile.
    pub support_rename: bool,
    /// DeleteFile.
    pub support_delete: bool,
    /// PutUserInfo and UserInfo.
    pub support_user_info: bool,
    /// Verify proof headers.
    pub enable_proof_validation: bool,
    /// Subject for tokens that carry no user.
    pub default_user: String,
    /// Default `UI_LLCC`.
    pub ui_language: Option<String>,
    /// Lifetime granted by Lock and RefreshLock.
    pub lock_duration: Duration,
    /// Accepted proof timestamp skew.
    pub proof_clock_skew: Duration,
    /// Rule for PutFile without an active lock.
    pub unlocked_put: UnlockedPutPolicy,
    /// Largest accepted PutFile body.
    pub max_put_bytes: Option<usize>,
    /// Restrictions applied to every file.
    pub restrictions: Restrictions,
    /// `CloseUrl` template.
    pub close_url: Option<String>,
    /// `DownloadUrl` template.
    pub download_url: Option<String>,
    /// `FileVersionUrl` template.
    pub file_version_url: Option<String>,
    /// `FileSharingUrl` template.
    pub file_sharing_url: Option<String>,
    /// `FileUrl` template.
    pub file_url: Option<String>,
    /// `SupportedShareUrlTypes`.
    pub supported_share_url_types: Option<Vec<String>>,
}

impl PolicyConfig {
    /// Creates a configuration with every optional feature enabled except
    /// proof validation.
    pub fn new() -> Self {
        Self {
            support_locks: true,
            support_get_lock: true,
            support_extended_lock_length: false,
            support_update: true,
            support_rename: true,
            support_delete: true,
            support_user_info: true,
            enable_proof_validation: false,
            default_user: "anonymous".into(),
            ui_language: None,
            lock_duration: Duration::from_secs(30 * 60),
            proof_clock_skew: Duration::from_secs(20 * 60),
            unlocked_put: UnlockedPutPolicy::default(),
            max_put_bytes: None,
            restrictions: Restrictions::default(),
            close_url: None,
            download_url: None,
            file_version_url: None,
            file_sharing_url: None,
            file_url: None,
            supported_share_url_types: None,
        }
    }

    /// Enables or disables locking.
    pub fn with_locks(mut self, enabled: bool) -> Self {
        self.support_locks = enabled;
        self
    }

    /// Enables or disables GetLock.
    pub fn with_get_lock(mut self, enabled: bool) -> Self {
        self.support_get_lock = enabled;
        self
    }

    /// Enables or disables 1024-character lock tokens.
    pub fn with_extended_lock_length(mut self, enabled: bool) -> Self {
        self.support_extended_lock_length = enabled;
        self
    }

    /// Enables or disables PutFile.
    pub fn with_update(mut self, enabled: bool) -> Self {
        self.support_update = enabled;
        self
    }

    /// Enables or disables RenameFile.
    pub fn with_rename(mut self, enabled: bool) -> Self {
        self.support_rename = enabled;
        self
    }

    /// Enables or disables DeleteFile.
    pub fn with_delete(mut self, enabled: bool) -> Self {
        self.support_delete = enabled;
        self
    }

    /// Enables or disables user info.
    pub fn with_user_info(mut self, enabled: bool) -> Self {
        self.support_user_info = enabled;
        self
    }

    /// Enables or disables proof validation.
    pub fn with_proof_validation(mut self, enabled: bool) -> Self {
        self.enable_proof_validation = enabled;
        self
    }

    /// Sets the default user.
    pub fn with_default_user(mut self, user: impl Into<String>) -> Self {
        self.default_user = user.into();
        self
    }

    /// Sets the default UI language.
    pub fn with_ui_language(mut self, language: impl Into<String>) -> Self {
        self.ui_language = Some(language.into());
        self
    }

    /// Sets the lock lifetime.
    pub fn with_lock_duration(mut self, duration: Duration) -> Self {
        self.lock_duration = duration;
        self
    }

    /// Sets the proof timestamp skew.
    pub fn with_proof_clock_skew(mut self, skew: Duration) -> Self {
        self.proof_clock_skew = skew;
        self
    }

    /// Sets the unlocked PutFile rule.
    pub fn with_unlocked_put(mut self, policy: UnlockedPutPolicy) -> Self {
        self.unlocked_put = policy;
        self
    }

    /// Sets the PutFile body limit.
    pub fn with_max_put_bytes(mut self, limit: usize) -> Self {
        self.max_put_bytes = Some(limit);
        self
    }

    /// Sets the restrictions applied to every file.
    pub fn with_restrictions(mut self, restrictions: Restrictions) -> Self {
        self.restrictions = restrictions;
        self
    }

    /// Sets the `CloseUrl` template.
    pub fn with_close_url(mut self, template: impl Into<String>) -> Self {
        self.close_url = Some(template.into());
        self
    }

    /// Sets the `DownloadUrl` template.
    pub fn with_download_url(mut self, template: impl Into<String>) -> Self {
        self.download_url = Some(template.into());
        self
    }

    /// Sets the `FileVersionUrl` template.
    pub fn with_file_version_url(mut self, template: impl Into<String>) -> Self {
        self.file_version_url = Some(template.into());
        self
    }

    /// Sets the `FileSharingUrl` template and share URL types.
    pub fn with_file_sharing_url(
        mut self,
        template: impl Into<String>,
        share_types: Vec<String>,
    ) -> Self {
        self.file_sharing_url = Some(template.into());
        self.supported_share_url_types = Some(share_types);
        self
    }

    /// Sets the `FileUrl` template.
    pub fn with_file_url(mut self, template: impl Into<String>) -> Self {
        self.file_url = Some(template.into());
        self
    }

    fn expand(template: &Option<String>, file: &FileHandle) -> Option<String> {
        template.as_ref().map(|t| t.replace("{id}", &file.id))
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FeaturePolicy for PolicyConfig {
    fn supports_locks(&self) -> bool {
        self.support_locks
    }

    fn supports_get_lock(&self) -> bool {
        self.support_locks && self.support_get_lock
    }

    fn supports_extended_lock_length(&self) -> bool {
        self.support_extended_lock_length
    }

    fn supports_update(&self) -> bool {
        self.support_update
    }

    fn supports_rename(&self) -> bool {
        self.support_rename
    }

    fn supports_delete(&self) -> bool {
        self.support_delete
    }

    fn supports_user_info(&self) -> bool {
        self.support_user_info
    }

    fn proof_validation_enabled(&self) -> bool {
        self.enable_proof_validation
    }

    fn default_user(&self) -> &str {
        &self.default_user
    }

    fn ui_language(&self) -> Option<&str> {
        self.ui_language.as_deref()
    }

    fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    fn proof_clock_skew(&self) -> Duration {
        self.proof_clock_skew
    }

    fn unlocked_put(&self) -> UnlockedPutPolicy {
        self.unlocked_put
    }

    fn max_put_bytes(&self) -> Option<usize> {
        self.max_put_bytes
    }

    fn restrictions(&self, _file: &FileHandle, _grant: &AccessGrant) -> Restrictions {
        self.restrictions.clone()
    }

    fn file_urls(&self, file: &FileHandle) -> FileUrls {
        FileUrls {
            close_url: Self::expand(&self.close_url, file),
            download_url: Self::expand(&self.download_url, file),
            file_version_url: Self::expand(&self.file_version_url, file),
            file_sharing_url: Self::expand(&self.file_sharing_url, file),
            file_url: Self::expand(&self.file_url, file),
            supported_share_url_types: self.supported_share_url_types.clone(),
        }
    }
}

/// Full host configuration: policy plus discovery and token settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Feature policy.
    pub policy: PolicyConfig,
    /// Discovery document URL of the editing client.
    pub discovery_url: Option<String>,
    /// How long a fetched discovery document stays fresh.
    pub discovery_ttl: Duration,
    /// Deadline for one discovery fetch.
    pub fetch_timeout: Duration,
    /// Host's own public base URL, e.g. `https://host.example`.
    pub server_url: Option<String>,
    /// Lifetime of issued access tokens, counted from issue.
    ///
    /// `WOPI_ACCESS_TOKEN_TTL` is read as whole seconds, not as an absolute
    /// expiry. The absolute form the client expects is derived per token
    /// when the host page is built.
    pub access_token_ttl: Duration,
    /// HMAC secret for signed access tokens.
    pub token_secret: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Creates a configuration around a policy.
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy,
            discovery_url: None,
            discovery_ttl: Duration::from_secs(12 * 60 * 60),
            fetch_timeout: Duration::from_secs(10),
            server_url: None,
            access_token_ttl: Duration::from_secs(10 * 60 * 60),
            token_secret: None,
        }
    }

    /// Sets the discovery URL.
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = Some(url.into());
        self
    }

    /// Sets the discovery TTL.
    pub fn with_discovery_ttl(mut self, ttl: Duration) -> Self {
        self.discovery_ttl = ttl;
        self
    }

    /// Sets the discovery fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the host's public base URL.
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    /// Sets the access token lifetime.
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    /// Enables signed access tokens with the given secret.
    pub fn with_token_secret(mut self, secret: Vec<u8>) -> Self {
        self.token_secret = Some(secret);
        self
    }

    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through a variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str, default: bool| -> Result<bool, ConfigError> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => parse_bool(&raw).ok_or(ConfigError::InvalidValue {
                    name: name.to_string(),
                    value: raw,
                }),
            }
        };
        let seconds = |name: &str| -> Result<Option<Duration>, ConfigError> {
            match lookup(name) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(|s| Some(Duration::from_secs(s)))
                    .map_err(|_| ConfigError::InvalidValue {
                        name: name.to_string(),
                        value: raw,
                    }),
            }
        };

        let defaults = PolicyConfig::new();
        let mut policy = PolicyConfig {
            support_locks: flag("WOPI_SUPPORT_LOCKS", defaults.support_locks)?,
            support_get_lock: flag("WOPI_SUPPORT_GET_LOCK", defaults.support_get_lock)?,
            support_extended_lock_length: flag(
                "WOPI_SUPPORT_EXTENDED_LOCK_LENGTH",
                defaults.support_extended_lock_length,
            )?,
            support_update: flag("WOPI_SUPPORT_UPDATE", defaults.support_update)?,
            support_rename: flag("WOPI_SUPPORT_RENAME", defaults.support_rename)?,
            support_delete: flag("WOPI_SUPPORT_DELETE", defaults.support_delete)?,
            support_user_info: flag("WOPI_SUPPORT_USER_INFO", defaults.support_user_info)?,
            enable_proof_validation: flag(
                "WOPI_ENABLE_PROOF_VALIDATION",
                defaults.enable_proof_validation,
            )?,
            ..defaults
        };
        if let Some(user) = lookup("WOPI_DEFAULT_USER") {
            policy.default_user = user;
        }
        if let Some(language) = lookup("WOPI_UI_LANGUAGE") {
            policy.ui_language = Some(language);
        }
        if let Some(raw) = lookup("WOPI_UNLOCKED_PUT") {
            policy.unlocked_put =
                UnlockedPutPolicy::parse(&raw).ok_or(ConfigError::InvalidValue {
                    name: "WOPI_UNLOCKED_PUT".into(),
                    value: raw,
                })?;
        }

        let mut config = ServerConfig::new(policy);
        config.discovery_url = lookup("WOPI_CLIENT_URL")
            .map(|base| discovery_url_for(&base));
        if let Some(url) = lookup("WOPI_SERVER_URL") {
            config = config.with_server_url(url);
        }
        if let Some(ttl) = seconds("WOPI_ACCESS_TOKEN_TTL")? {
            config.access_token_ttl = ttl;
        }
        if let Some(ttl) = seconds("WOPI_DISCOVERY_TTL")? {
            config.discovery_ttl = ttl;
        }
        config.token_secret = lookup("WOPI_TOKEN_SECRET").map(String::into_bytes);
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.enable_proof_validation && self.discovery_url.is_none() {
            return Err(ConfigError::MissingDiscovery);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

/// Accepts either a full discovery URL or the client's base URL.
fn discovery_url_for(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/hosting/discovery") {
        base.to_string()
    } else {
        format!("{base}/hosting/discovery")
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn default_policy() {
        let policy = PolicyConfig::default();
        assert!(policy.supports_locks());
        assert!(!policy.proof_validation_enabled());
        assert_eq!(policy.lock_duration(), Duration::from_secs(1800));
        assert_eq!(policy.proof_clock_skew(), Duration::from_secs(1200));
        assert_eq!(policy.unlocked_put(), UnlockedPutPolicy::EmptyFileOnly);
        assert_eq!(policy.lock_length_limit(), 256);
    }

    #[test]
    fn get_lock_requires_locks() {
        let policy = PolicyConfig::new().with_locks(false);
        assert!(!policy.supports_get_lock());
    }

    #[test]
    fn url_templates_expand_id() {
        let policy = PolicyConfig::new().with_close_url("https://host/close/{id}");
        let file = FileHandle::new("doc-1", "a.docx", "owner", "v1");
        assert_eq!(
            policy.file_urls(&file).close_url.as_deref(),
            Some("https://host/close/doc-1")
        );
        assert_eq!(policy.file_urls(&file).download_url, None);
    }

    #[test]
    fn from_lookup_reads_variables() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("WOPI_CLIENT_URL", "https://office.example/"),
            ("WOPI_SERVER_URL", "https://host.example/wopi/"),
            ("WOPI_ENABLE_PROOF_VALIDATION", "true"),
            ("WOPI_SUPPORT_RENAME", "0"),
            ("WOPI_ACCESS_TOKEN_TTL", "60"),
            ("WOPI_DEFAULT_USER", "guest"),
        ]))
        .unwrap();

        assert_eq!(
            config.discovery_url.as_deref(),
            Some("https://office.example/hosting/discovery")
        );
        assert_eq!(config.server_url.as_deref(), Some("https://host.example/wopi"));
        assert!(config.policy.enable_proof_validation);
        assert!(!config.policy.support_rename);
        assert_eq!(config.access_token_ttl, Duration::from_secs(60));
        assert_eq!(config.policy.default_user, "guest");
    }

    #[test]
    fn access_token_ttl_is_a_lifetime_in_seconds() {
        let config =
            ServerConfig::from_lookup(lookup(&[("WOPI_ACCESS_TOKEN_TTL", "3600")])).unwrap();
        assert_eq!(config.access_token_ttl, Duration::from_secs(60 * 60));

        // An epoch-millisecond expiry is not reinterpreted.
        let config = ServerConfig::from_lookup(lookup(&[(
            "WOPI_ACCESS_TOKEN_TTL",
            "1704067200000",
        )]))
        .unwrap();
        assert_eq!(config.access_token_ttl, Duration::from_secs(1_704_067_200_000));
    }

    #[test]
    fn from_lookup_rejects_bad_values() {
        let err = ServerConfig::from_lookup(lookup(&[("WOPI_SUPPORT_LOCKS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = ServerConfig::from_lookup(lookup(&[("WOPI_ACCESS_TOKEN_TTL", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn proof_validation_needs_discovery() {
        let err = ServerConfig::from_lookup(lookup(&[("WOPI_ENABLE_PROOF_VALIDATION", "1")]))
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingDiscovery);
    }
}
