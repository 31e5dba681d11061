//! Header names and a case-insensitive header collection.

/// Query parameter carrying the bearer credential.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";
/// Selects the POST-multiplexed operation.
pub const HEADER_OVERRIDE: &str = "X-WOPI-Override";
/// Lock token presented by the client, or echoed back on conflict.
pub const HEADER_LOCK: &str = "X-WOPI-Lock";
/// Previous lock token for UnlockAndRelock.
pub const HEADER_OLD_LOCK: &str = "X-WOPI-OldLock";
/// Signed request timestamp.
pub const HEADER_TIMESTAMP: &str = "X-WOPI-TimeStamp";
/// Signature made with the client's current proof key.
pub const HEADER_PROOF: &str = "X-WOPI-Proof";
/// Signature made with the client's previous proof key.
pub const HEADER_PROOF_OLD: &str = "X-WOPI-ProofOld";
/// File version after GetFile/PutFile.
pub const HEADER_ITEM_VERSION: &str = "X-WOPI-ItemVersion";
/// Human-readable reason attached to lock conflicts.
pub const HEADER_LOCK_FAILURE_REASON: &str = "X-WOPI-LockFailureReason";
/// Target name for RenameFile.
pub const HEADER_REQUESTED_NAME: &str = "X-WOPI-RequestedName";
/// Reason a RenameFile target was refused.
pub const HEADER_INVALID_FILE_NAME_ERROR: &str = "X-WOPI-InvalidFileNameError";

/// Ordered header list with case-insensitive lookup.
///
/// Names keep the casing they were inserted with so responses round-trip
/// the canonical spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Inserts a header, replacing any existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Returns the raw value of a header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the trimmed value of a header, treating empty as absent.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Returns true if the header is present, even if empty.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let headers = Headers::new().with("x-wopi-lock", "abc");
        assert_eq!(headers.get(HEADER_LOCK), Some("abc"));
        assert_eq!(headers.get("X-WOPI-LOCK"), Some("abc"));
    }

    #[test]
    fn insert_replaces() {
        let mut headers = Headers::new();
        headers.insert(HEADER_LOCK, "one");
        headers.insert("x-wopi-lock", "two");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get(HEADER_LOCK), Some("two"));
    }

    #[test]
    fn empty_values_are_absent_for_non_empty_lookup() {
        let headers = Headers::new().with(HEADER_LOCK, "  ");
        assert!(headers.contains(HEADER_LOCK));
        assert_eq!(headers.get_non_empty(HEADER_LOCK), None);
    }
}
