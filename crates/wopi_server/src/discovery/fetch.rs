//! Discovery transports.

use super::DiscoveryError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Retrieves the raw discovery manifest.
///
/// Implementations must honour `timeout` and fail with
/// [`DiscoveryError::Fetch`] rather than block past it.
pub trait DiscoveryFetcher: Send + Sync {
    /// Fetches the manifest at `url`.
    fn fetch(&self, url: &str, timeout: Duration) -> Result<String, DiscoveryError>;
}

/// Serves a manifest held in memory.
///
/// Used for embedded deployments and tests; the served document and failure
/// mode can be changed at runtime.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    document: Mutex<Option<String>>,
    failure: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
}

impl StaticFetcher {
    /// Creates a fetcher serving `xml`.
    pub fn new(xml: impl Into<String>) -> Self {
        let fetcher = Self::default();
        fetcher.set_document(xml);
        fetcher
    }

    /// Replaces the served document and clears any failure.
    pub fn set_document(&self, xml: impl Into<String>) {
        *self.document.lock() = Some(xml.into());
        *self.failure.lock() = None;
    }

    /// Makes every fetch fail with `message`.
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Delays every fetch.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of fetches attempted.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl DiscoveryFetcher for StaticFetcher {
    fn fetch(&self, _url: &str, timeout: Duration) -> Result<String, DiscoveryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            if delay > timeout {
                std::thread::sleep(timeout);
                return Err(DiscoveryError::Fetch("timed out".into()));
            }
            std::thread::sleep(delay);
        }
        if let Some(message) = self.failure.lock().clone() {
            return Err(DiscoveryError::Fetch(message));
        }
        self.document
            .lock()
            .clone()
            .ok_or_else(|| DiscoveryError::Fetch("no document configured".into()))
    }
}

/// Reads the manifest from the local filesystem.
///
/// `url` is a path, optionally prefixed with `file://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl DiscoveryFetcher for FileFetcher {
    fn fetch(&self, url: &str, _timeout: Duration) -> Result<String, DiscoveryError> {
        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read_to_string(path).map_err(|e| DiscoveryError::Fetch(format!("{path}: {e}")))
    }
}

/// Fetches the manifest over HTTP(S).
#[cfg(feature = "http")]
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqFetcher;

#[cfg(feature = "http")]
impl DiscoveryFetcher for UreqFetcher {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<String, DiscoveryError> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        let mut response = agent
            .get(url)
            .call()
            .map_err(|e| DiscoveryError::Fetch(format!("{url}: {e}")))?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|e| DiscoveryError::Fetch(format!("{url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_fetcher_serves_and_fails() {
        let fetcher = StaticFetcher::new("<wopi-discovery/>");
        assert_eq!(
            fetcher.fetch("ignored", Duration::from_secs(1)).unwrap(),
            "<wopi-discovery/>"
        );

        fetcher.set_failure("down");
        assert_eq!(
            fetcher.fetch("ignored", Duration::from_secs(1)),
            Err(DiscoveryError::Fetch("down".into()))
        );
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[test]
    fn static_fetcher_times_out() {
        let fetcher = StaticFetcher::new("<wopi-discovery/>");
        fetcher.set_delay(Duration::from_millis(50));
        assert!(fetcher.fetch("x", Duration::from_millis(5)).is_err());
    }

    #[test]
    fn file_fetcher_reads_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery.xml");
        std::fs::write(&path, "<wopi-discovery/>").unwrap();

        let url = format!("file://{}", path.display());
        assert_eq!(
            FileFetcher.fetch(&url, Duration::from_secs(1)).unwrap(),
            "<wopi-discovery/>"
        );
        assert!(FileFetcher
            .fetch("/definitely/not/here.xml", Duration::from_secs(1))
            .is_err());
    }
}
