//! Host facade.

use crate::auth::{SignedTokenAuthority, TokenConfig};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, ServerConfig};
use crate::discovery::{ActionUrlBuilder, DiscoveryCache, DiscoveryFetcher};
use crate::engine::ProtocolEngine;
use crate::error::{EngineError, EngineResult};
use crate::policy::FeaturePolicy;
use crate::repository::DocumentRepository;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use wopi_protocol::{Headers, WopiRequest, WopiResponse};

/// Parameters for the page that embeds the editing client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPage {
    /// Client frame URL.
    pub action_url: String,
    /// Access token to post to the frame.
    pub access_token: String,
    /// Token expiry, milliseconds since the Unix epoch.
    pub access_token_ttl: i64,
}

/// A configured WOPI host.
///
/// Wires a [`ServerConfig`] into a [`ProtocolEngine`], a discovery cache and,
/// when a secret is configured, signed access tokens. Transport adapters
/// hand raw request parts to [`WopiServer::handle`].
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use wopi_protocol::Headers;
/// use wopi_server::{MemoryRepository, PolicyConfig, ServerConfig, StaticFetcher, WopiServer};
///
/// let repository = Arc::new(MemoryRepository::new());
/// repository.insert("doc-1", "Plan.docx", "owner", b"hello".to_vec());
///
/// let config = ServerConfig::new(PolicyConfig::default());
/// let server = WopiServer::new(config, repository, Box::new(StaticFetcher::default())).unwrap();
///
/// let response = server.handle(
///     "GET",
///     "/wopi/files/doc-1/contents?access_token=t",
///     Headers::new(),
///     Vec::new(),
/// );
/// assert_eq!(response.body.to_bytes(), b"hello");
/// ```
pub struct WopiServer {
    config: ServerConfig,
    engine: ProtocolEngine,
    repository: Arc<dyn DocumentRepository>,
    discovery: Option<Arc<DiscoveryCache>>,
    tokens: Option<SignedTokenAuthority>,
    clock: Arc<dyn Clock>,
}

impl WopiServer {
    /// Creates a host using the wall clock.
    pub fn new(
        config: ServerConfig,
        repository: Arc<dyn DocumentRepository>,
        fetcher: Box<dyn DiscoveryFetcher>,
    ) -> Result<Self, ConfigError> {
        Self::with_clock(config, repository, fetcher, Arc::new(SystemClock))
    }

    /// Creates a host with an explicit clock.
    pub fn with_clock(
        config: ServerConfig,
        repository: Arc<dyn DocumentRepository>,
        fetcher: Box<dyn DiscoveryFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let discovery = config.discovery_url.as_ref().map(|url| {
            Arc::new(
                DiscoveryCache::new(url.clone(), fetcher)
                    .with_ttl(config.discovery_ttl)
                    .with_timeout(config.fetch_timeout),
            )
        });
        let tokens = config.token_secret.clone().map(|secret| {
            SignedTokenAuthority::with_clock(
                TokenConfig::new(secret).with_ttl(config.access_token_ttl),
                clock.clone(),
            )
        });

        let mut builder = ProtocolEngine::builder(repository.clone(), Arc::new(config.policy.clone()))
            .with_clock(clock.clone());
        if let Some(discovery) = &discovery {
            builder = builder.with_discovery(discovery.clone());
        }
        if let Some(server_url) = &config.server_url {
            builder = builder.with_host_url(server_url.clone());
        }
        if let Some(tokens) = &tokens {
            builder = builder.with_users(Arc::new(tokens.clone()));
        }

        Ok(Self {
            engine: builder.build()?,
            config,
            repository,
            discovery,
            tokens,
            clock,
        })
    }

    /// The protocol engine.
    pub fn engine(&self) -> &ProtocolEngine {
        &self.engine
    }

    /// The discovery cache, if a discovery URL is configured.
    pub fn discovery(&self) -> Option<&Arc<DiscoveryCache>> {
        self.discovery.as_ref()
    }

    /// The configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Decodes and handles raw request parts.
    ///
    /// An origin-form `url` is rebased on the configured server URL so proofs
    /// are checked against the URL the client signed.
    pub fn handle(&self, method: &str, url: &str, headers: Headers, body: Vec<u8>) -> WopiResponse {
        match WopiRequest::decode(method, url, headers, body) {
            Ok(mut request) => {
                if let (false, Some(server_url)) = (url.contains("://"), &self.config.server_url) {
                    request.url = format!("{server_url}{url}");
                }
                self.engine.handle(&request)
            }
            Err(err) => {
                debug!(method, url, error = %err, "request not decoded");
                EngineError::from(err).into_response()
            }
        }
    }

    /// CheckFileInfo URL of a file, as passed to the client in `WOPISrc`.
    pub fn wopi_src(&self, file_id: &str) -> EngineResult<String> {
        let server_url = self
            .config
            .server_url
            .as_deref()
            .ok_or_else(|| EngineError::Internal("server URL not configured".into()))?;
        let invalid = || EngineError::Internal(format!("server URL {server_url:?} is not a base URL"));
        let mut url = url::Url::parse(server_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["wopi", "files", file_id]);
        Ok(url.to_string())
    }

    /// Client frame URL for `action` on a file.
    pub fn action_url(&self, file_id: &str, action: &str) -> EngineResult<String> {
        let file = self
            .repository
            .find(file_id)?
            .ok_or_else(|| EngineError::NotFound(file_id.to_string()))?;
        let extension = file
            .extension()
            .ok_or(EngineError::Unsupported("file without extension"))?;
        let discovery = self
            .discovery
            .as_ref()
            .ok_or_else(|| EngineError::Internal("discovery URL not configured".into()))?;

        let descriptor = discovery.resolve_action(&extension, action)?;
        let mut builder = ActionUrlBuilder::new(descriptor.urlsrc, self.wopi_src(file_id)?);
        if let Some(language) = self.config.policy.ui_language() {
            builder = builder.with_language(language);
        }
        Ok(builder.build())
    }

    /// Action URL plus a fresh access token for `user_id`.
    ///
    /// Without a token secret the token is a random opaque string, accepted by
    /// the default user context.
    pub fn host_page(&self, file_id: &str, user_id: &str, action: &str) -> EngineResult<HostPage> {
        let action_url = self.action_url(file_id, action)?;
        let (access_token, expires_at) = match &self.tokens {
            Some(tokens) => {
                let issued = tokens.create_token(file_id, user_id)?;
                (issued.token, issued.expires_at)
            }
            None => {
                let ttl = chrono::Duration::from_std(self.config.access_token_ttl)
                    .map_err(|e| EngineError::Internal(format!("token ttl out of range: {e}")))?;
                (Uuid::new_v4().simple().to_string(), self.clock.now() + ttl)
            }
        };
        Ok(HostPage {
            action_url,
            access_token,
            access_token_ttl: expires_at.timestamp_millis(),
        })
    }
}
