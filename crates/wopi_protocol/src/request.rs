//! Decoded requests.

use crate::error::{ProtocolError, ProtocolResult};
use crate::headers::{
    Headers, ACCESS_TOKEN_PARAM, HEADER_LOCK, HEADER_OLD_LOCK, HEADER_OVERRIDE,
    HEADER_REQUESTED_NAME,
};
use crate::lock::LockToken;
use crate::operation::{Method, Operation, Resource};

/// A transport-agnostic WOPI request.
///
/// Built either by [`WopiRequest::decode`] from raw HTTP parts, or directly
/// with [`WopiRequest::new`] and the `with_*` setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WopiRequest {
    /// Operation addressed by method, path and override.
    pub operation: Operation,
    /// File id from the path.
    pub file_id: String,
    /// `access_token` query parameter.
    pub access_token: Option<String>,
    /// Request headers.
    pub headers: Headers,
    /// Request body.
    pub body: Vec<u8>,
    /// Request URL as received, used for proof validation.
    pub url: String,
}

impl WopiRequest {
    /// Creates a request for an operation on a file.
    pub fn new(operation: Operation, file_id: impl Into<String>) -> Self {
        Self {
            operation,
            file_id: file_id.into(),
            access_token: None,
            headers: Headers::new(),
            body: Vec::new(),
            url: String::new(),
        }
    }

    /// Decodes raw HTTP parts.
    ///
    /// `url` may be absolute (`https://host/wopi/files/1?access_token=..`) or
    /// origin-form (`/wopi/files/1?access_token=..`).
    pub fn decode(
        method: &str,
        url: &str,
        headers: Headers,
        body: Vec<u8>,
    ) -> ProtocolResult<Self> {
        let method = Method::parse(method)?;
        let (path, query) = split_url(url)?;
        let (file_id, resource) = Resource::parse_path(&path)?;
        let operation = Operation::route(method, resource, headers.get(HEADER_OVERRIDE))?;

        let access_token = query.as_deref().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == ACCESS_TOKEN_PARAM)
                .map(|(_, v)| v.into_owned())
        });

        Ok(Self {
            operation,
            file_id,
            access_token,
            headers,
            body,
            url: url.to_string(),
        })
    }

    /// Sets the access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the `X-WOPI-Lock` header.
    pub fn with_lock(self, token: impl Into<String>) -> Self {
        self.with_header(HEADER_LOCK, token)
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the URL used for proof validation.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Returns the access token if present and non-empty.
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Returns the validated `X-WOPI-Lock` header, if present.
    pub fn lock_token(&self, extended: bool) -> ProtocolResult<Option<LockToken>> {
        self.optional_lock(HEADER_LOCK, extended)
    }

    /// Returns the validated `X-WOPI-Lock` header, failing if absent.
    pub fn require_lock_token(&self, extended: bool) -> ProtocolResult<LockToken> {
        self.lock_token(extended)?
            .ok_or(ProtocolError::MissingHeader(HEADER_LOCK))
    }

    /// Returns the validated `X-WOPI-OldLock` header, if present.
    pub fn old_lock_token(&self, extended: bool) -> ProtocolResult<Option<LockToken>> {
        self.optional_lock(HEADER_OLD_LOCK, extended)
    }

    /// Returns the `X-WOPI-RequestedName` header, failing if absent.
    pub fn requested_name(&self) -> ProtocolResult<&str> {
        self.headers
            .get_non_empty(HEADER_REQUESTED_NAME)
            .ok_or(ProtocolError::MissingHeader(HEADER_REQUESTED_NAME))
    }

    /// Returns the path and query part of the URL.
    pub fn path_and_query(&self) -> &str {
        match self.url.find("://") {
            Some(scheme_end) => {
                let rest = &self.url[scheme_end + 3..];
                rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
            }
            None => &self.url,
        }
    }

    fn optional_lock(&self, header: &str, extended: bool) -> ProtocolResult<Option<LockToken>> {
        match self.headers.get_non_empty(header) {
            Some(raw) => Ok(Some(LockToken::parse(raw, extended)?)),
            None => Ok(None),
        }
    }
}

fn split_url(raw: &str) -> ProtocolResult<(String, Option<String>)> {
    if raw.contains("://") {
        let parsed = url::Url::parse(raw).map_err(|_| ProtocolError::InvalidPath(raw.to_string()))?;
        return Ok((parsed.path().to_string(), parsed.query().map(str::to_string)));
    }
    match raw.split_once('?') {
        Some((path, query)) => Ok((path.to_string(), Some(query.to_string()))),
        None => Ok((raw.to_string(), None)),
    }
}
