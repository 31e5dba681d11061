//! Parsed discovery manifest.

use super::DiscoveryError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

const CAPABILITIES_APP: &str = "Capabilities";
const CAPABILITIES_ACTION: &str = "getinfo";

/// One `<action>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryAction {
    /// Owning application name.
    pub app: String,
    /// Action name, e.g. `view` or `edit`.
    pub name: String,
    /// Extension without dot; empty for MIME-type apps.
    pub ext: String,
    /// URL template with `<name=PLACEHOLDER&>` segments.
    pub urlsrc: String,
    /// Host features the action depends on, e.g. `locks`, `update`.
    pub requires: Vec<String>,
    /// Whether this is the default action for the extension.
    pub default: bool,
}

/// One `<app>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryApp {
    /// Application name, or a MIME type.
    pub name: String,
    /// Favicon URL.
    pub fav_icon_url: Option<String>,
    /// Actions in document order.
    pub actions: Vec<DiscoveryAction>,
}

/// An RSA public key as published in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofKey {
    /// Big-endian modulus.
    pub modulus: Vec<u8>,
    /// Big-endian public exponent.
    pub exponent: Vec<u8>,
}

/// Current and previous proof key epochs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofKeys {
    /// Key the client signs `X-WOPI-Proof` with.
    pub current: ProofKey,
    /// Key the client signs `X-WOPI-ProofOld` with, during rotation.
    pub previous: Option<ProofKey>,
}

/// A parsed discovery manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscoveryDocument {
    apps: Vec<DiscoveryApp>,
    proof_keys: Option<ProofKeys>,
}

impl DiscoveryDocument {
    /// Parses manifest XML.
    pub fn parse(xml: &str) -> Result<Self, DiscoveryError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut doc = DiscoveryDocument::default();
        let mut current_app: Option<DiscoveryApp> = None;
        let mut saw_root = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match e.local_name().as_ref() {
                    b"wopi-discovery" => saw_root = true,
                    b"app" => current_app = Some(parse_app(&e)?),
                    b"action" => push_action(&mut current_app, &e)?,
                    b"proof-key" => doc.proof_keys = parse_proof_keys(&e)?,
                    _ => {}
                },
                Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"wopi-discovery" => saw_root = true,
                    b"app" => doc.apps.push(parse_app(&e)?),
                    b"action" => push_action(&mut current_app, &e)?,
                    b"proof-key" => doc.proof_keys = parse_proof_keys(&e)?,
                    _ => {}
                },
                Ok(Event::End(e)) => {
                    if e.local_name().as_ref() == b"app" {
                        if let Some(app) = current_app.take() {
                            doc.apps.push(app);
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(DiscoveryError::Parse(format!(
                        "at position {}: {e}",
                        reader.buffer_position()
                    )))
                }
                _ => {}
            }
        }

        if !saw_root {
            return Err(DiscoveryError::Parse("missing <wopi-discovery> root".into()));
        }
        Ok(doc)
    }

    /// Applications in document order.
    pub fn apps(&self) -> &[DiscoveryApp] {
        &self.apps
    }

    /// Finds the action named `action` for `extension`.
    ///
    /// The extension matches case-insensitively with or without a leading
    /// dot; the action name matches exactly.
    pub fn resolve_action(
        &self,
        extension: &str,
        action: &str,
    ) -> Result<&DiscoveryAction, DiscoveryError> {
        let ext = normalize_extension(extension);
        self.actions()
            .find(|a| !a.ext.is_empty() && a.ext.eq_ignore_ascii_case(ext) && a.name == action)
            .ok_or_else(|| DiscoveryError::UnsupportedAction {
                extension: ext.to_string(),
                action: action.to_string(),
            })
    }

    /// Every action offered for `extension`.
    pub fn discover_extension(&self, extension: &str) -> Vec<&DiscoveryAction> {
        let ext = normalize_extension(extension);
        self.actions()
            .filter(|a| a.ext.eq_ignore_ascii_case(ext))
            .collect()
    }

    /// Every action of the app named by `mime_type`.
    pub fn discover_mime_type(&self, mime_type: &str) -> Vec<&DiscoveryAction> {
        self.apps
            .iter()
            .filter(|app| app.name.eq_ignore_ascii_case(mime_type))
            .flat_map(|app| app.actions.iter())
            .collect()
    }

    /// The client's capabilities endpoint, if published.
    pub fn capabilities_url(&self) -> Option<&str> {
        self.apps
            .iter()
            .filter(|app| app.name == CAPABILITIES_APP)
            .flat_map(|app| app.actions.iter())
            .find(|a| a.name == CAPABILITIES_ACTION)
            .map(|a| a.urlsrc.as_str())
    }

    /// Both proof key epochs.
    pub fn proof_keys(&self) -> Result<&ProofKeys, DiscoveryError> {
        self.proof_keys.as_ref().ok_or(DiscoveryError::NoProofKeys)
    }

    fn actions(&self) -> impl Iterator<Item = &DiscoveryAction> {
        self.apps.iter().flat_map(|app| app.actions.iter())
    }
}

fn normalize_extension(extension: &str) -> &str {
    extension.trim().trim_start_matches('.')
}

fn attributes(e: &BytesStart<'_>) -> Result<HashMap<String, String>, DiscoveryError> {
    let mut out = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DiscoveryError::Parse(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| DiscoveryError::Parse(err.to_string()))?;
        out.insert(key, value.into_owned());
    }
    Ok(out)
}

fn parse_app(e: &BytesStart<'_>) -> Result<DiscoveryApp, DiscoveryError> {
    let mut attrs = attributes(e)?;
    let name = attrs
        .remove("name")
        .ok_or_else(|| DiscoveryError::Parse("<app> without name".into()))?;
    Ok(DiscoveryApp {
        name,
        fav_icon_url: attrs.remove("favIconUrl"),
        actions: Vec::new(),
    })
}

fn push_action(
    current_app: &mut Option<DiscoveryApp>,
    e: &BytesStart<'_>,
) -> Result<(), DiscoveryError> {
    let Some(app) = current_app.as_mut() else {
        return Ok(());
    };
    let mut attrs = attributes(e)?;
    let name = attrs
        .remove("name")
        .ok_or_else(|| DiscoveryError::Parse(format!("<action> without name in {}", app.name)))?;
    let urlsrc = attrs
        .remove("urlsrc")
        .ok_or_else(|| DiscoveryError::Parse(format!("<action {name}> without urlsrc")))?;
    let requires = attrs
        .remove("requires")
        .map(|r| {
            r.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    app.actions.push(DiscoveryAction {
        app: app.name.clone(),
        name,
        ext: attrs.remove("ext").unwrap_or_default(),
        urlsrc,
        requires,
        default: attrs.remove("default").is_some_and(|d| d == "true"),
    });
    Ok(())
}

fn parse_proof_keys(e: &BytesStart<'_>) -> Result<Option<ProofKeys>, DiscoveryError> {
    let attrs = attributes(e)?;
    let key = |modulus: &str, exponent: &str| -> Result<Option<ProofKey>, DiscoveryError> {
        match (attrs.get(modulus), attrs.get(exponent)) {
            (Some(m), Some(x)) if !m.is_empty() && !x.is_empty() => Ok(Some(ProofKey {
                modulus: decode_key_part(modulus, m)?,
                exponent: decode_key_part(exponent, x)?,
            })),
            _ => Ok(None),
        }
    };

    let Some(current) = key("modulus", "exponent")? else {
        return Ok(None);
    };
    let previous = key("oldmodulus", "oldexponent")?;
    Ok(Some(ProofKeys { current, previous }))
}

fn decode_key_part(name: &str, value: &str) -> Result<Vec<u8>, DiscoveryError> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| DiscoveryError::Parse(format!("proof-key {name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<wopi-discovery>
  <net-zone name="external-https">
    <app name="Word" favIconUrl="https://office.example/word.ico">
      <action name="view" ext="docx" default="true"
              urlsrc="https://office.example/wv/view.aspx?&lt;ui=UI_LLCC&amp;&gt;" />
      <action name="edit" ext="docx" requires="locks,update"
              urlsrc="https://office.example/we/edit.aspx?&lt;ui=UI_LLCC&amp;&gt;" />
    </app>
    <app name="Excel">
      <action name="view" ext="xlsx" urlsrc="https://office.example/x/view.aspx?" />
    </app>
    <app name="application/vnd.ms-excel">
      <action name="view" ext="" urlsrc="https://office.example/x/mime.aspx?" />
    </app>
    <app name="Capabilities">
      <action name="getinfo" ext="" urlsrc="https://office.example/capabilities.json" />
    </app>
  </net-zone>
  <proof-key value="AAAA" modulus="AQID" exponent="AQAB" oldvalue="AAAA" oldmodulus="BAUG" oldexponent="AQAB" />
</wopi-discovery>"#;

    #[test]
    fn parses_apps_and_actions() {
        let doc = DiscoveryDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.apps().len(), 4);

        let edit = doc.resolve_action("DOCX", "edit").unwrap();
        assert_eq!(edit.app, "Word");
        assert_eq!(edit.requires, vec!["locks", "update"]);
        assert!(edit.urlsrc.contains("<ui=UI_LLCC&>"));

        let view = doc.resolve_action(".docx", "view").unwrap();
        assert!(view.default);
    }

    #[test]
    fn unknown_action_is_explicit() {
        let doc = DiscoveryDocument::parse(SAMPLE).unwrap();
        let err = doc.resolve_action("xlsx", "edit").unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::UnsupportedAction {
                extension: "xlsx".into(),
                action: "edit".into()
            }
        );
        assert!(doc.resolve_action("pdf", "view").is_err());
    }

    #[test]
    fn extension_and_mime_queries() {
        let doc = DiscoveryDocument::parse(SAMPLE).unwrap();
        assert_eq!(doc.discover_extension("docx").len(), 2);
        assert_eq!(doc.discover_mime_type("application/vnd.ms-excel").len(), 1);
        assert_eq!(
            doc.capabilities_url(),
            Some("https://office.example/capabilities.json")
        );
    }

    #[test]
    fn proof_keys_both_epochs() {
        let doc = DiscoveryDocument::parse(SAMPLE).unwrap();
        let keys = doc.proof_keys().unwrap();
        assert_eq!(keys.current.modulus, vec![1, 2, 3]);
        assert_eq!(keys.current.exponent, vec![1, 0, 1]);
        assert_eq!(keys.previous.as_ref().unwrap().modulus, vec![4, 5, 6]);
    }

    #[test]
    fn missing_proof_keys() {
        let doc = DiscoveryDocument::parse("<wopi-discovery><net-zone/></wopi-discovery>").unwrap();
        assert_eq!(doc.proof_keys().unwrap_err(), DiscoveryError::NoProofKeys);
    }

    #[test]
    fn rejects_garbage() {
        assert!(DiscoveryDocument::parse("not xml at all").is_err());
        assert!(DiscoveryDocument::parse("<wopi-discovery><app></wopi-discovery>").is_err());
        assert!(DiscoveryDocument::parse(
            r#"<wopi-discovery><proof-key modulus="!!" exponent="AQAB"/></wopi-discovery>"#
        )
        .is_err());
    }
}
