//! CLI command implementations.

pub mod action_url;
pub mod discovery;
pub mod proof;
pub mod token;

use std::sync::Arc;
use tracing::debug;
use wopi_server::{DiscoveryCache, DiscoveryFetcher, FileFetcher, UreqFetcher};

/// Opens a discovery cache over a file path or an http(s) URL.
pub fn open_discovery(source: &str) -> Arc<DiscoveryCache> {
    let remote = source.starts_with("http://") || source.starts_with("https://");
    debug!(source, remote, "opening discovery document");
    let fetcher: Box<dyn DiscoveryFetcher> = if remote {
        Box::new(UreqFetcher)
    } else {
        Box::new(FileFetcher)
    };
    Arc::new(DiscoveryCache::new(source, fetcher))
}

/// Prints a value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
