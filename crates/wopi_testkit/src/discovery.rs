//! Discovery document builder.

use crate::keys::ProofKeyPair;

/// One `<action>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    /// Action name, e.g. `edit`.
    pub name: String,
    /// File extension without dot.
    pub ext: String,
    /// URL template.
    pub urlsrc: String,
}

impl ActionEntry {
    /// Creates an action.
    pub fn new(name: &str, ext: &str, urlsrc: &str) -> Self {
        Self {
            name: name.to_string(),
            ext: ext.to_string(),
            urlsrc: urlsrc.to_string(),
        }
    }
}

/// Builds discovery XML.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryBuilder {
    apps: Vec<(String, Vec<ActionEntry>)>,
    proof_key: Option<(String, String)>,
    old_proof_key: Option<(String, String)>,
}

impl DiscoveryBuilder {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Word, Excel and PowerPoint view/edit actions plus the capabilities app.
    pub fn office_defaults() -> Self {
        let office = |app: &str, ext: &str| {
            vec![
                ActionEntry::new(
                    "view",
                    ext,
                    &format!("https://office.example/{app}/view.aspx?<ui=UI_LLCC&><rs=DC_LLCC&><dchat=DISABLE_CHAT&>"),
                ),
                ActionEntry::new(
                    "edit",
                    ext,
                    &format!("https://office.example/{app}/edit.aspx?<ui=UI_LLCC&><rs=DC_LLCC&><hid=HOST_SESSION_ID&>"),
                ),
            ]
        };
        Self::new()
            .with_app("Word", office("we", "docx"))
            .with_app("Excel", office("x", "xlsx"))
            .with_app("PowerPoint", office("p", "pptx"))
            .with_app(
                "Capabilities",
                vec![ActionEntry::new(
                    "getinfo",
                    "",
                    "https://office.example/hosting/capabilities",
                )],
            )
    }

    /// Adds an application.
    pub fn with_app(mut self, name: &str, actions: Vec<ActionEntry>) -> Self {
        self.apps.push((name.to_string(), actions));
        self
    }

    /// Publishes proof keys.
    pub fn with_proof_keys(mut self, current: &ProofKeyPair, previous: Option<&ProofKeyPair>) -> Self {
        self.proof_key = Some((current.modulus_b64(), current.exponent_b64()));
        self.old_proof_key = previous.map(|key| (key.modulus_b64(), key.exponent_b64()));
        self
    }

    /// Renders the XML.
    pub fn build(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<wopi-discovery>\n");
        xml.push_str("  <net-zone name=\"external-https\">\n");
        for (name, actions) in &self.apps {
            xml.push_str(&format!("    <app name=\"{}\">\n", escape(name)));
            for action in actions {
                xml.push_str(&format!(
                    "      <action name=\"{}\" ext=\"{}\" urlsrc=\"{}\"/>\n",
                    escape(&action.name),
                    escape(&action.ext),
                    escape(&action.urlsrc)
                ));
            }
            xml.push_str("    </app>\n");
        }
        xml.push_str("  </net-zone>\n");
        if let Some((modulus, exponent)) = &self.proof_key {
            let (old_modulus, old_exponent) = self.old_proof_key.clone().unwrap_or_default();
            xml.push_str(&format!(
                "  <proof-key value=\"\" modulus=\"{modulus}\" exponent=\"{exponent}\" oldvalue=\"\" oldmodulus=\"{old_modulus}\" oldexponent=\"{old_exponent}\"/>\n"
            ));
        }
        xml.push_str("</wopi-discovery>\n");
        xml
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
