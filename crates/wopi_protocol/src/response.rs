//! Protocol responses.

use crate::headers::Headers;

/// Response body variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// No body.
    Empty,
    /// Raw bytes (GetFile).
    Bytes(Vec<u8>),
    /// JSON document (CheckFileInfo, RenameFile).
    Json(serde_json::Value),
}

impl ResponseBody {
    /// Serializes the body to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ResponseBody::Empty => Vec::new(),
            ResponseBody::Bytes(bytes) => bytes.clone(),
            ResponseBody::Json(value) => value.to_string().into_bytes(),
        }
    }

    /// Returns the content type, if the body has one.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            ResponseBody::Empty => None,
            ResponseBody::Bytes(_) => Some("application/octet-stream"),
            ResponseBody::Json(_) => Some("application/json"),
        }
    }
}

/// A protocol response: status, headers and body.
#[derive(Debug, Clone, PartialEq)]
pub struct WopiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: ResponseBody,
}

impl WopiResponse {
    /// A `200` with no body.
    pub fn ok() -> Self {
        Self::status(200)
    }

    /// A response with the given status and no body.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: ResponseBody::Empty,
        }
    }

    /// A `200` with a JSON body.
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            body: ResponseBody::Json(value),
            ..Self::ok()
        }
    }

    /// A `200` with a raw byte body.
    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self {
            body: ResponseBody::Bytes(bytes),
            ..Self::ok()
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
