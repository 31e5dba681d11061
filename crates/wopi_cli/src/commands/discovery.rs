//! Discovery command implementation.

use super::{open_discovery, print_json};
use serde::Serialize;
use wopi_server::DiscoveryDocument;

/// One listed action.
#[derive(Debug, Serialize)]
pub struct ActionSummary {
    /// Application name.
    pub app: String,
    /// Action name.
    pub action: String,
    /// Extension.
    pub ext: String,
    /// Whether this is the default action.
    pub default: bool,
    /// URL template.
    pub urlsrc: String,
}

/// Discovery listing.
#[derive(Debug, Serialize)]
pub struct DiscoverySummary {
    /// Document source.
    pub source: String,
    /// Number of applications.
    pub app_count: usize,
    /// Listed actions.
    pub actions: Vec<ActionSummary>,
    /// Capabilities endpoint, if published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities_url: Option<String>,
    /// Whether a current proof key is published.
    pub proof_key: bool,
    /// Whether a previous proof key is published.
    pub old_proof_key: bool,
}

/// Builds the listing for a parsed document.
pub fn summarize(source: &str, document: &DiscoveryDocument, ext: Option<&str>) -> DiscoverySummary {
    let actions = match ext {
        Some(ext) => document.discover_extension(ext),
        None => document.apps().iter().flat_map(|app| app.actions.iter()).collect(),
    };
    let keys = document.proof_keys().ok();
    DiscoverySummary {
        source: source.to_string(),
        app_count: document.apps().len(),
        actions: actions
            .into_iter()
            .map(|a| ActionSummary {
                app: a.app.clone(),
                action: a.name.clone(),
                ext: a.ext.clone(),
                default: a.default,
                urlsrc: a.urlsrc.clone(),
            })
            .collect(),
        capabilities_url: document.capabilities_url().map(str::to_string),
        proof_key: keys.is_some(),
        old_proof_key: keys.is_some_and(|k| k.previous.is_some()),
    }
}

/// Runs the discovery command.
pub fn run(source: &str, ext: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let document = open_discovery(source).discover()?;
    let summary = summarize(source, &document, ext);

    if format == "json" {
        return print_json(&summary);
    }

    println!("Discovery: {}", summary.source);
    println!("Applications: {}", summary.app_count);
    if let Some(url) = &summary.capabilities_url {
        println!("Capabilities: {url}");
    }
    println!(
        "Proof keys: current={} previous={}",
        summary.proof_key, summary.old_proof_key
    );
    println!();
    for action in &summary.actions {
        let marker = if action.default { " (default)" } else { "" };
        println!("  {:<12} {:<8} {:<6}{}", action.app, action.action, action.ext, marker);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<wopi-discovery><net-zone>
<app name="Word"><action name="view" ext="docx" default="true" urlsrc="https://o/v?"/><action name="edit" ext="docx" urlsrc="https://o/e?"/></app>
<app name="Excel"><action name="view" ext="xlsx" urlsrc="https://o/x?"/></app>
</net-zone></wopi-discovery>"#;

    #[test]
    fn summary_filters_by_extension() {
        let document = DiscoveryDocument::parse(XML).unwrap();
        let all = summarize("mem", &document, None);
        assert_eq!(all.app_count, 2);
        assert_eq!(all.actions.len(), 3);
        assert!(!all.proof_key);

        let docx = summarize("mem", &document, Some(".DOCX"));
        assert_eq!(docx.actions.len(), 2);
        assert!(docx.actions[0].default);
    }

    #[test]
    fn run_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discovery.xml");
        std::fs::write(&path, XML).unwrap();
        run(path.to_str().unwrap(), Some("xlsx"), "json").unwrap();
    }
}
