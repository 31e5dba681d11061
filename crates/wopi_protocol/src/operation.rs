//! Operation routing.

use crate::error::{ProtocolError, ProtocolResult};
use percent_encoding::percent_decode_str;

/// HTTP methods used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

impl Method {
    /// Parses a method name (case-insensitive).
    pub fn parse(raw: &str) -> ProtocolResult<Self> {
        if raw.eq_ignore_ascii_case("GET") {
            Ok(Method::Get)
        } else if raw.eq_ignore_ascii_case("POST") {
            Ok(Method::Post)
        } else {
            Err(ProtocolError::UnsupportedMethod(raw.to_string()))
        }
    }
}

/// The file-scoped resource a path addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// `/wopi/files/{id}`
    File,
    /// `/wopi/files/{id}/contents`
    Contents,
}

impl Resource {
    /// Splits a request path into file id and resource.
    ///
    /// Accepts an optional prefix before `files/` so hosts can mount the
    /// endpoint anywhere.
    pub fn parse_path(path: &str) -> ProtocolResult<(String, Resource)> {
        let path = path.split('?').next().unwrap_or(path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let files_at = segments
            .iter()
            .position(|s| *s == "files")
            .ok_or_else(|| ProtocolError::InvalidPath(path.to_string()))?;

        match &segments[files_at + 1..] {
            [id] => Ok((decode_segment(id), Resource::File)),
            [id, "contents"] => Ok((decode_segment(id), Resource::Contents)),
            _ => Err(ProtocolError::InvalidPath(path.to_string())),
        }
    }
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// A WOPI operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Return file properties and capabilities.
    CheckFileInfo,
    /// Return file content.
    GetFile,
    /// Replace file content.
    PutFile,
    /// Acquire, relock, or swap (with `X-WOPI-OldLock`) a lock.
    Lock,
    /// Release a lock.
    Unlock,
    /// Extend a lock's expiry.
    RefreshLock,
    /// Read the current lock.
    GetLock,
    /// Store opaque user info.
    PutUserInfo,
    /// Rename the file.
    RenameFile,
    /// Delete the file.
    DeleteFile,
}

impl Operation {
    /// Every operation, in dispatch order.
    pub const ALL: [Operation; 10] = [
        Operation::CheckFileInfo,
        Operation::GetFile,
        Operation::PutFile,
        Operation::Lock,
        Operation::Unlock,
        Operation::RefreshLock,
        Operation::GetLock,
        Operation::PutUserInfo,
        Operation::RenameFile,
        Operation::DeleteFile,
    ];

    /// Resolves the operation addressed by a method, resource and override.
    pub fn route(
        method: Method,
        resource: Resource,
        override_header: Option<&str>,
    ) -> ProtocolResult<Self> {
        let keyword = override_header.map(str::trim).filter(|v| !v.is_empty());
        match (method, resource) {
            (Method::Get, Resource::File) => Ok(Operation::CheckFileInfo),
            (Method::Get, Resource::Contents) => Ok(Operation::GetFile),
            (Method::Post, Resource::Contents) => match keyword {
                None | Some("PUT") => Ok(Operation::PutFile),
                Some(other) => Err(ProtocolError::InvalidOverride(other.to_string())),
            },
            (Method::Post, Resource::File) => {
                let keyword = keyword.ok_or(ProtocolError::MissingHeader(
                    crate::headers::HEADER_OVERRIDE,
                ))?;
                Self::from_override(keyword)
                    .filter(|op| *op != Operation::PutFile)
                    .ok_or_else(|| ProtocolError::InvalidOverride(keyword.to_string()))
            }
        }
    }

    /// Maps an exact `X-WOPI-Override` keyword to its operation.
    pub fn from_override(keyword: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.override_keyword() == Some(keyword))
    }

    /// The `X-WOPI-Override` keyword, for POST-multiplexed operations.
    pub fn override_keyword(self) -> Option<&'static str> {
        match self {
            Operation::CheckFileInfo | Operation::GetFile => None,
            Operation::PutFile => Some("PUT"),
            Operation::Lock => Some("LOCK"),
            Operation::Unlock => Some("UNLOCK"),
            Operation::RefreshLock => Some("REFRESH_LOCK"),
            Operation::GetLock => Some("GET_LOCK"),
            Operation::PutUserInfo => Some("PUT_USER_INFO"),
            Operation::RenameFile => Some("RENAME_FILE"),
            Operation::DeleteFile => Some("DELETE"),
        }
    }

    /// Returns true if the operation requires a non-empty `X-WOPI-Lock`.
    ///
    /// PutFile reads the header too, but an absent header is judged by the
    /// lock rules rather than rejected outright.
    pub fn requires_lock_header(self) -> bool {
        matches!(
            self,
            Operation::Lock | Operation::Unlock | Operation::RefreshLock
        )
    }

    /// Returns true if the operation may change file state.
    pub fn is_mutating(self) -> bool {
        !matches!(
            self,
            Operation::CheckFileInfo | Operation::GetFile | Operation::GetLock
        )
    }

    /// Operation name as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Operation::CheckFileInfo => "CheckFileInfo",
            Operation::GetFile => "GetFile",
            Operation::PutFile => "PutFile",
            Operation::Lock => "Lock",
            Operation::Unlock => "Unlock",
            Operation::RefreshLock => "RefreshLock",
            Operation::GetLock => "GetLock",
            Operation::PutUserInfo => "PutUserInfo",
            Operation::RenameFile => "RenameFile",
            Operation::DeleteFile => "DeleteFile",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_paths() {
        assert_eq!(
            Resource::parse_path("/wopi/files/doc-1").unwrap(),
            ("doc-1".to_string(), Resource::File)
        );
        assert_eq!(
            Resource::parse_path("/wopi/files/doc-1/contents").unwrap(),
            ("doc-1".to_string(), Resource::Contents)
        );
        assert_eq!(
            Resource::parse_path("/files/a%20b?access_token=x").unwrap(),
            ("a b".to_string(), Resource::File)
        );
    }

    #[test]
    fn reject_bad_paths() {
        assert!(Resource::parse_path("/wopi/folders/1").is_err());
        assert!(Resource::parse_path("/wopi/files").is_err());
        assert!(Resource::parse_path("/wopi/files/1/contents/extra").is_err());
    }

    #[test]
    fn get_routes_ignore_override() {
        assert_eq!(
            Operation::route(Method::Get, Resource::File, Some("LOCK")).unwrap(),
            Operation::CheckFileInfo
        );
        assert_eq!(
            Operation::route(Method::Get, Resource::Contents, None).unwrap(),
            Operation::GetFile
        );
    }

    #[test]
    fn post_file_dispatches_on_override() {
        for op in [
            Operation::Lock,
            Operation::Unlock,
            Operation::RefreshLock,
            Operation::GetLock,
            Operation::PutUserInfo,
            Operation::RenameFile,
            Operation::DeleteFile,
        ] {
            let keyword = op.override_keyword().unwrap();
            assert_eq!(
                Operation::route(Method::Post, Resource::File, Some(keyword)).unwrap(),
                op
            );
        }
    }

    #[test]
    fn override_must_match_exactly() {
        assert_eq!(
            Operation::route(Method::Post, Resource::File, Some("lock")),
            Err(ProtocolError::InvalidOverride("lock".into()))
        );
        assert_eq!(
            Operation::route(Method::Post, Resource::File, None),
            Err(ProtocolError::MissingHeader("X-WOPI-Override"))
        );
        assert!(Operation::route(Method::Post, Resource::File, Some("PUT")).is_err());
    }

    #[test]
    fn put_file_accepts_missing_or_put_override() {
        assert_eq!(
            Operation::route(Method::Post, Resource::Contents, None).unwrap(),
            Operation::PutFile
        );
        assert_eq!(
            Operation::route(Method::Post, Resource::Contents, Some("PUT")).unwrap(),
            Operation::PutFile
        );
        assert!(Operation::route(Method::Post, Resource::Contents, Some("LOCK")).is_err());
    }

    #[test]
    fn methods() {
        assert_eq!(Method::parse("get").unwrap(), Method::Get);
        assert!(Method::parse("DELETE").is_err());
    }
}
