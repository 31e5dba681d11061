//! Action URL expansion.
//!
//! `urlsrc` templates carry optional query parameters in the form
//! `<name=PLACEHOLDER&>`. A segment whose placeholder has a value becomes
//! `name=value&`; every other segment is removed. `WOPISrc` is then appended.

use std::collections::HashMap;
use url::form_urlencoded::byte_serialize;

/// Placeholders the builder knows how to fill.
const UI_LLCC: &str = "UI_LLCC";
const DC_LLCC: &str = "DC_LLCC";
const DISABLE_CHAT: &str = "DISABLE_CHAT";
const HOST_SESSION_ID: &str = "HOST_SESSION_ID";
const WOPI_SOURCE: &str = "WOPI_SOURCE";

/// Builds a client frame URL from a discovery action.
#[derive(Debug, Clone)]
pub struct ActionUrlBuilder {
    urlsrc: String,
    wopi_src: String,
    values: HashMap<&'static str, String>,
}

impl ActionUrlBuilder {
    /// Starts from an action's `urlsrc` and the file's CheckFileInfo URL.
    pub fn new(urlsrc: impl Into<String>, wopi_src: impl Into<String>) -> Self {
        Self {
            urlsrc: urlsrc.into(),
            wopi_src: wopi_src.into(),
            values: HashMap::new(),
        }
    }

    /// Sets the UI language, and the data culture if not set separately.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        self.values.entry(DC_LLCC).or_insert_with(|| language.clone());
        self.values.insert(UI_LLCC, language);
        self
    }

    /// Sets the data culture.
    pub fn with_data_culture(mut self, culture: impl Into<String>) -> Self {
        self.values.insert(DC_LLCC, culture.into());
        self
    }

    /// Disables chat in the client.
    pub fn with_chat_disabled(mut self) -> Self {
        self.values.insert(DISABLE_CHAT, "1".into());
        self
    }

    /// Sets the host session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.values.insert(HOST_SESSION_ID, session_id.into());
        self
    }

    /// Expands the template.
    pub fn build(&self) -> String {
        let mut out = String::with_capacity(self.urlsrc.len() + self.wopi_src.len() + 16);
        let mut wopi_src_emitted = false;
        let mut rest = self.urlsrc.as_str();

        while let Some(open) = rest.find('<') {
            out.push_str(&rest[..open]);
            let Some(close) = rest[open..].find('>') else {
                rest = &rest[open..];
                break;
            };
            let segment = &rest[open + 1..open + close];
            if let Some((name, placeholder)) = segment.trim_end_matches('&').split_once('=') {
                let value = if placeholder == WOPI_SOURCE {
                    wopi_src_emitted = true;
                    Some(self.wopi_src.clone())
                } else {
                    self.values.get(placeholder).cloned()
                };
                if let Some(value) = value {
                    out.push_str(name);
                    out.push('=');
                    out.extend(byte_serialize(value.as_bytes()));
                    out.push('&');
                }
            }
            rest = &rest[open + close + 1..];
        }
        out.push_str(rest);

        if !wopi_src_emitted {
            if !out.contains('?') {
                out.push('?');
            } else if !out.ends_with('?') && !out.ends_with('&') {
                out.push('&');
            }
            out.push_str("WOPISrc=");
            out.extend(byte_serialize(self.wopi_src.as_bytes()));
        }
        out.trim_end_matches('&').to_string()
    }
}
