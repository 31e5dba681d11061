//! Action URL command implementation.

use super::open_discovery;
use wopi_server::{ActionUrlBuilder, DiscoveryCache};

/// Resolves and expands an action URL.
pub fn build(
    discovery: &DiscoveryCache,
    ext: &str,
    action: &str,
    wopi_src: &str,
    language: Option<&str>,
) -> Result<String, wopi_server::DiscoveryError> {
    let descriptor = discovery.resolve_action(ext, action)?;
    let mut builder = ActionUrlBuilder::new(descriptor.urlsrc, wopi_src);
    if let Some(language) = language {
        builder = builder.with_language(language);
    }
    Ok(builder.build())
}

/// Runs the action-url command.
pub fn run(
    source: &str,
    ext: &str,
    action: &str,
    wopi_src: &str,
    language: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let discovery = open_discovery(source);
    println!("{}", build(&discovery, ext, action, wopi_src, language)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wopi_server::{DiscoveryDocument, DiscoveryError, StaticFetcher};

    fn cache() -> DiscoveryCache {
        let doc = DiscoveryDocument::parse(
            r#"<wopi-discovery><app name="Word"><action name="edit" ext="docx" urlsrc="https://o/e?&lt;ui=UI_LLCC&amp;&gt;"/></app></wopi-discovery>"#,
        )
        .unwrap();
        DiscoveryCache::new("mem", Box::new(StaticFetcher::default())).with_document(doc)
    }

    #[test]
    fn builds_url() {
        let url = build(&cache(), "docx", "edit", "https://h/wopi/files/1", Some("fr-FR")).unwrap();
        assert_eq!(url, "https://o/e?ui=fr-FR&WOPISrc=https%3A%2F%2Fh%2Fwopi%2Ffiles%2F1");
    }

    #[test]
    fn unknown_action() {
        let err = build(&cache(), "docx", "present", "https://h", None).unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedAction { .. }));
    }
}
