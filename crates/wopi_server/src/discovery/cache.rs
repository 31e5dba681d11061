//! Process-wide discovery cache.

use super::document::{DiscoveryAction, DiscoveryDocument, ProofKey, ProofKeys};
use super::fetch::DiscoveryFetcher;
use super::DiscoveryError;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_TTL: Duration = Duration::from_secs(12 * 60 * 60);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

struct CachedDocument {
    document: Arc<DiscoveryDocument>,
    fetched_at: Instant,
    invalidated: bool,
}

impl CachedDocument {
    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.invalidated && self.fetched_at.elapsed() < ttl
    }
}

/// Lazily fetched, TTL-bounded discovery document.
///
/// At most one refresh runs at a time. While a refresh is in flight, callers
/// that already have a (stale) document get it immediately instead of
/// waiting. A failed refresh keeps the stale document. Only an empty cache
/// makes callers wait, and only an empty cache surfaces fetch errors. Callers
/// that waited on a cold fetch share its outcome instead of fetching again.
pub struct DiscoveryCache {
    url: String,
    fetcher: Box<dyn DiscoveryFetcher>,
    ttl: Duration,
    timeout: Duration,
    cached: RwLock<Option<CachedDocument>>,
    /// Held while fetching; carries the error of the last failed cold fetch.
    refresh: Mutex<Option<DiscoveryError>>,
    /// Completed cold fetches.
    generation: AtomicU64,
}

impl DiscoveryCache {
    /// Creates an empty cache for the manifest at `url`.
    pub fn new(url: impl Into<String>, fetcher: Box<dyn DiscoveryFetcher>) -> Self {
        Self {
            url: url.into(),
            fetcher,
            ttl: DEFAULT_TTL,
            timeout: DEFAULT_TIMEOUT,
            cached: RwLock::new(None),
            refresh: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Sets how long a fetched document stays fresh.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the deadline passed to the fetcher.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Seeds the cache with an already parsed document.
    pub fn with_document(self, document: DiscoveryDocument) -> Self {
        self.store(Arc::new(document));
        self
    }

    /// Manifest URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the cached document, fetching or refreshing as needed.
    pub fn discover(&self) -> Result<Arc<DiscoveryDocument>, DiscoveryError> {
        let stale = {
            let cached = self.cached.read();
            match cached.as_ref() {
                Some(entry) if entry.is_fresh(self.ttl) => return Ok(entry.document.clone()),
                Some(entry) => Some(entry.document.clone()),
                None => None,
            }
        };

        match stale {
            Some(stale) => {
                let Some(_guard) = self.refresh.try_lock() else {
                    debug!(url = %self.url, "discovery refresh in flight, serving cached document");
                    return Ok(stale);
                };
                if let Some(fresh) = self.fresh() {
                    return Ok(fresh);
                }
                match self.fetch() {
                    Ok(document) => Ok(document),
                    Err(e) => {
                        warn!(url = %self.url, error = %e, "discovery refresh failed, keeping cached document");
                        Ok(stale)
                    }
                }
            }
            None => {
                let observed = self.generation.load(Ordering::Acquire);
                let mut last_failure = self.refresh.lock();
                if let Some(entry) = self.cached.read().as_ref() {
                    return Ok(entry.document.clone());
                }
                if self.generation.load(Ordering::Acquire) != observed {
                    if let Some(err) = last_failure.clone() {
                        debug!(
                            url = %self.url,
                            error = %err,
                            "sharing failure of concurrent discovery fetch"
                        );
                        return Err(err);
                    }
                }
                let result = self.fetch();
                *last_failure = result.as_ref().err().cloned();
                self.generation.fetch_add(1, Ordering::AcqRel);
                result
            }
        }
    }

    /// Resolves an action for an extension.
    pub fn resolve_action(
        &self,
        extension: &str,
        action: &str,
    ) -> Result<DiscoveryAction, DiscoveryError> {
        self.discover()?.resolve_action(extension, action).cloned()
    }

    /// Both proof key epochs from one document snapshot.
    pub fn proof_keys(&self) -> Result<ProofKeys, DiscoveryError> {
        self.discover()?.proof_keys().cloned()
    }

    /// The current proof key.
    pub fn current_proof_key(&self) -> Result<ProofKey, DiscoveryError> {
        Ok(self.proof_keys()?.current)
    }

    /// The previous proof key, if the client published one.
    pub fn previous_proof_key(&self) -> Result<Option<ProofKey>, DiscoveryError> {
        Ok(self.proof_keys()?.previous)
    }

    /// Marks the cached document stale; the next call refreshes it.
    pub fn invalidate(&self) {
        if let Some(entry) = self.cached.write().as_mut() {
            entry.invalidated = true;
        }
    }

    fn fresh(&self) -> Option<Arc<DiscoveryDocument>> {
        self.cached
            .read()
            .as_ref()
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.document.clone())
    }

    fn fetch(&self) -> Result<Arc<DiscoveryDocument>, DiscoveryError> {
        let xml = self.fetcher.fetch(&self.url, self.timeout)?;
        let document = Arc::new(DiscoveryDocument::parse(&xml)?);
        info!(
            url = %self.url,
            apps = document.apps().len(),
            "discovery document refreshed"
        );
        self.store(document.clone());
        Ok(document)
    }

    fn store(&self, document: Arc<DiscoveryDocument>) {
        *self.cached.write() = Some(CachedDocument {
            document,
            fetched_at: Instant::now(),
            invalidated: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticFetcher;
    use std::sync::Barrier;

    const DOC_A: &str = r#"<wopi-discovery><net-zone><app name="Word">
        <action name="edit" ext="docx" urlsrc="https://a.example/edit?"/>
        </app></net-zone></wopi-discovery>"#;
    const DOC_B: &str = r#"<wopi-discovery><net-zone><app name="Word">
        <action name="edit" ext="docx" urlsrc="https://b.example/edit?"/>
        </app></net-zone></wopi-discovery>"#;

    struct Shared(Arc<StaticFetcher>);

    impl DiscoveryFetcher for Shared {
        fn fetch(&self, url: &str, timeout: Duration) -> Result<String, DiscoveryError> {
            self.0.fetch(url, timeout)
        }
    }

    fn cache(fetcher: &Arc<StaticFetcher>) -> DiscoveryCache {
        DiscoveryCache::new("https://office.example/hosting/discovery", Box::new(Shared(fetcher.clone())))
    }

    #[test]
    fn fetches_once_within_ttl() {
        let fetcher = Arc::new(StaticFetcher::new(DOC_A));
        let cache = cache(&fetcher);

        cache.discover().unwrap();
        cache.discover().unwrap();
        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(
            cache.resolve_action("docx", "edit").unwrap().urlsrc,
            "https://a.example/edit?"
        );
    }

    #[test]
    fn refreshes_after_expiry() {
        let fetcher = Arc::new(StaticFetcher::new(DOC_A));
        let cache = cache(&fetcher).with_ttl(Duration::ZERO);

        cache.discover().unwrap();
        fetcher.set_document(DOC_B);
        let doc = cache.discover().unwrap();
        assert_eq!(
            doc.resolve_action("docx", "edit").unwrap().urlsrc,
            "https://b.example/edit?"
        );
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[test]
    fn failed_refresh_keeps_stale_document() {
        let fetcher = Arc::new(StaticFetcher::new(DOC_A));
        let cache = cache(&fetcher);
        cache.discover().unwrap();

        cache.invalidate();
        fetcher.set_failure("connection refused");
        let doc = cache.discover().unwrap();
        assert!(doc.resolve_action("docx", "edit").is_ok());
    }

    #[test]
    fn failure_without_cache_is_an_error() {
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.set_failure("connection refused");
        let cache = cache(&fetcher);

        assert_eq!(
            cache.discover().unwrap_err(),
            DiscoveryError::Fetch("connection refused".into())
        );
        assert!(cache.proof_keys().is_err());
    }

    #[test]
    fn preloaded_document_needs_no_fetch() {
        let fetcher = Arc::new(StaticFetcher::default());
        let cache = cache(&fetcher).with_document(DiscoveryDocument::parse(DOC_A).unwrap());
        assert!(cache.resolve_action("docx", "edit").is_ok());
        assert_eq!(fetcher.fetch_count(), 0);
    }

    #[test]
    fn concurrent_refresh_collapses_to_one_fetch() {
        let fetcher = Arc::new(StaticFetcher::new(DOC_A));
        let cache = cache(&fetcher);
        cache.discover().unwrap();

        cache.invalidate();
        fetcher.set_document(DOC_B);
        fetcher.set_delay(Duration::from_millis(100));

        let barrier = Barrier::new(8);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    cache.discover().unwrap();
                });
            }
        });

        // One initial fetch plus exactly one refresh.
        assert_eq!(fetcher.fetch_count(), 2);
        assert_eq!(
            cache.resolve_action("docx", "edit").unwrap().urlsrc,
            "https://b.example/edit?"
        );
    }

    #[test]
    fn concurrent_cold_start_fetches_once() {
        let fetcher = Arc::new(StaticFetcher::new(DOC_A));
        fetcher.set_delay(Duration::from_millis(50));
        let cache = cache(&fetcher);

        let barrier = Barrier::new(8);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    assert!(cache.discover().is_ok());
                });
            }
        });
        assert_eq!(fetcher.fetch_count(), 1);
    }

    #[test]
    fn concurrent_cold_start_shares_failure() {
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.set_failure("connection refused");
        fetcher.set_delay(Duration::from_millis(200));
        let cache = cache(&fetcher);

        let barrier = Barrier::new(8);
        let started = Instant::now();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    barrier.wait();
                    assert_eq!(
                        cache.discover().unwrap_err(),
                        DiscoveryError::Fetch("connection refused".into())
                    );
                });
            }
        });

        assert_eq!(fetcher.fetch_count(), 1);
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn cold_failure_does_not_block_later_fetch() {
        let fetcher = Arc::new(StaticFetcher::default());
        fetcher.set_failure("connection refused");
        let cache = cache(&fetcher);
        assert!(cache.discover().is_err());

        fetcher.set_document(DOC_A);
        assert!(cache.discover().is_ok());
        assert_eq!(fetcher.fetch_count(), 2);
    }
}
