//! CheckFileInfo property negotiation.
//!
//! Properties come from an ordered table of probes. Each probe is a pure
//! function of the file, the grant and the policy, and returns `None` when
//! the property does not apply. A `None` property is left out of the
//! response entirely: clients read a missing property as "use the protocol
//! default", which is not the same as `false`.

use crate::policy::{FeaturePolicy, FileUrls, Restrictions};
use crate::repository::FileHandle;
use crate::user::AccessGrant;
use chrono::SecondsFormat;
use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

/// A property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(u64),
    /// String.
    Text(String),
    /// List of strings.
    List(Vec<String>),
}

impl PropertyValue {
    /// Converts to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Bool(b) => serde_json::Value::Bool(*b),
            PropertyValue::Int(n) => serde_json::Value::from(*n),
            PropertyValue::Text(s) => serde_json::Value::String(s.clone()),
            PropertyValue::List(items) => serde_json::Value::Array(
                items.iter().cloned().map(serde_json::Value::String).collect(),
            ),
        }
    }
}

/// Inputs available to every probe.
pub struct ProbeContext<'a> {
    /// File being described.
    pub file: &'a FileHandle,
    /// Requesting subject.
    pub grant: &'a AccessGrant,
    /// Feature policy.
    pub policy: &'a dyn FeaturePolicy,
    /// Stored user info for the subject.
    pub user_info: Option<&'a str>,
    /// Client restrictions for this file and subject.
    pub restrictions: Restrictions,
    /// Host URLs for this file.
    pub urls: FileUrls,
    /// Whether the subject may write.
    pub user_can_write: bool,
}

impl<'a> ProbeContext<'a> {
    /// Builds the context, evaluating policy lookups once.
    pub fn new(
        file: &'a FileHandle,
        grant: &'a AccessGrant,
        policy: &'a dyn FeaturePolicy,
        user_info: Option<&'a str>,
    ) -> Self {
        let restrictions = policy.restrictions(file, grant);
        let user_can_write = user_can_write(policy, file, grant, &restrictions);
        Self {
            file,
            grant,
            policy,
            user_info,
            urls: policy.file_urls(file),
            restrictions,
            user_can_write,
        }
    }

    fn user_id(&self) -> String {
        self.grant
            .user_id
            .clone()
            .unwrap_or_else(|| self.policy.default_user().to_string())
    }
}

/// A named property and the function that computes it.
#[derive(Clone, Copy)]
pub struct Probe {
    /// Property name as sent to the client.
    pub property: &'static str,
    /// Computes the value, or `None` to omit it.
    pub evaluate: fn(&ProbeContext<'_>) -> Option<PropertyValue>,
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe").field("property", &self.property).finish()
    }
}

fn text(value: impl Into<String>) -> Option<PropertyValue> {
    Some(PropertyValue::Text(value.into()))
}

fn flag(value: Option<bool>) -> Option<PropertyValue> {
    value.map(PropertyValue::Bool)
}

fn optional_text(value: &Option<String>) -> Option<PropertyValue> {
    value.clone().map(PropertyValue::Text)
}

/// Standard CheckFileInfo properties, in response order.
pub const PROBES: &[Probe] = &[
    Probe { property: "BaseFileName", evaluate: |c| text(c.file.name.as_str()) },
    Probe { property: "OwnerId", evaluate: |c| text(c.file.owner_id.as_str()) },
    Probe { property: "Size", evaluate: |c| Some(PropertyValue::Int(c.file.size)) },
    Probe { property: "Version", evaluate: |c| text(c.file.version.as_str()) },
    Probe { property: "UserId", evaluate: |c| text(c.user_id()) },
    Probe {
        property: "UserFriendlyName",
        evaluate: |c| text(c.grant.user_friendly_name.clone().unwrap_or_else(|| c.user_id())),
    },
    Probe {
        property: "ReadOnly",
        evaluate: |c| flag(c.restrictions.read_only.or((!c.user_can_write).then_some(true))),
    },
    Probe {
        property: "UserCanNotWriteRelative",
        evaluate: |c| flag(Some(c.restrictions.user_can_not_write_relative.unwrap_or(true))),
    },
    Probe {
        property: "UserCanRename",
        evaluate: |c| {
            c.policy
                .supports_rename()
                .then_some(PropertyValue::Bool(c.user_can_write))
        },
    },
    Probe { property: "UserCanWrite", evaluate: |c| flag(Some(c.user_can_write)) },
    Probe { property: "CloseUrl", evaluate: |c| optional_text(&c.urls.close_url) },
    Probe { property: "DownloadUrl", evaluate: |c| optional_text(&c.urls.download_url) },
    Probe { property: "FileVersionUrl", evaluate: |c| optional_text(&c.urls.file_version_url) },
    Probe { property: "FileSharingUrl", evaluate: |c| optional_text(&c.urls.file_sharing_url) },
    Probe {
        property: "SupportedShareUrlTypes",
        evaluate: |c| c.urls.supported_share_url_types.clone().map(PropertyValue::List),
    },
    Probe { property: "FileUrl", evaluate: |c| optional_text(&c.urls.file_url) },
    Probe {
        property: "FileExtension",
        evaluate: |c| c.file.extension().map(|ext| PropertyValue::Text(format!(".{ext}"))),
    },
    Probe {
        property: "LastModifiedTime",
        evaluate: |c| {
            c.file
                .last_modified
                .map(|t| PropertyValue::Text(t.to_rfc3339_opts(SecondsFormat::Secs, true)))
        },
    },
    Probe { property: "SHA256", evaluate: |c| optional_text(&c.file.sha256) },
    Probe { property: "DisablePrint", evaluate: |c| flag(c.restrictions.disable_print) },
    Probe { property: "HidePrintOption", evaluate: |c| flag(c.restrictions.hide_print_option) },
    Probe { property: "DisableExport", evaluate: |c| flag(c.restrictions.disable_export) },
    Probe { property: "HideExportOption", evaluate: |c| flag(c.restrictions.hide_export_option) },
    Probe { property: "DisableCopy", evaluate: |c| flag(c.restrictions.disable_copy) },
    Probe {
        property: "UserInfo",
        evaluate: |c| {
            c.user_info
                .filter(|_| c.policy.supports_user_info())
                .and_then(text)
        },
    },
    Probe { property: "SupportsUserInfo", evaluate: |c| flag(Some(c.policy.supports_user_info())) },
    Probe { property: "SupportsDeleteFile", evaluate: |c| flag(Some(c.policy.supports_delete())) },
    Probe { property: "SupportsLocks", evaluate: |c| flag(Some(c.policy.supports_locks())) },
    Probe { property: "SupportsGetLock", evaluate: |c| flag(Some(c.policy.supports_get_lock())) },
    Probe { property: "SupportsUpdate", evaluate: |c| flag(Some(c.policy.supports_update())) },
    Probe { property: "SupportsRename", evaluate: |c| flag(Some(c.policy.supports_rename())) },
    Probe {
        property: "SupportsExtendedLockLength",
        evaluate: |c| flag(Some(c.policy.supports_extended_lock_length())),
    },
];

/// Ordered property mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    properties: IndexMap<&'static str, PropertyValue>,
}

impl CapabilitySet {
    /// Returns a property.
    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.get(property)
    }

    /// Returns true if the property is present.
    pub fn contains(&self, property: &str) -> bool {
        self.properties.contains_key(property)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Properties in order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PropertyValue)> {
        self.properties.iter().map(|(k, v)| (*k, v))
    }

    /// Converts to a JSON object, preserving order.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_json()))
                .collect(),
        )
    }
}

/// Evaluates the probe table.
pub struct CapabilityResolver {
    policy: Arc<dyn FeaturePolicy>,
    probes: Vec<Probe>,
}

impl CapabilityResolver {
    /// Creates a resolver with the standard probes.
    pub fn new(policy: Arc<dyn FeaturePolicy>) -> Self {
        Self {
            policy,
            probes: PROBES.to_vec(),
        }
    }

    /// Appends a host-specific probe after the standard ones.
    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probes.push(probe);
        self
    }

    /// Computes the properties for `file` as seen by `grant`.
    pub fn resolve(
        &self,
        file: &FileHandle,
        grant: &AccessGrant,
        user_info: Option<&str>,
    ) -> CapabilitySet {
        let context = ProbeContext::new(file, grant, self.policy.as_ref(), user_info);
        let properties = self
            .probes
            .iter()
            .filter_map(|probe| (probe.evaluate)(&context).map(|value| (probe.property, value)))
            .collect();
        CapabilitySet { properties }
    }

    /// Whether `grant` may modify `file`.
    pub fn user_can_write(&self, file: &FileHandle, grant: &AccessGrant) -> bool {
        let restrictions = self.policy.restrictions(file, grant);
        user_can_write(self.policy.as_ref(), file, grant, &restrictions)
    }
}

fn user_can_write(
    policy: &dyn FeaturePolicy,
    file: &FileHandle,
    grant: &AccessGrant,
    restrictions: &Restrictions,
) -> bool {
    policy.supports_update()
        && policy.user_can_write(file, grant)
        && restrictions.read_only != Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyConfig;
    use chrono::{TimeZone, Utc};

    fn file() -> FileHandle {
        let mut file = FileHandle::new("doc-1", "Plan.docx", "owner-1", "v1");
        file.size = 5;
        file.sha256 = Some("abc=".into());
        file.last_modified = Some(Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap());
        file
    }

    fn resolve(policy: PolicyConfig, grant: &AccessGrant) -> CapabilitySet {
        CapabilityResolver::new(Arc::new(policy)).resolve(&file(), grant, Some("{\"x\":1}"))
    }

    #[test]
    fn standard_properties() {
        let grant = AccessGrant::anonymous("tok").with_user("alice");
        let caps = resolve(PolicyConfig::default(), &grant);

        assert_eq!(caps.get("BaseFileName"), Some(&PropertyValue::Text("Plan.docx".into())));
        assert_eq!(caps.get("Size"), Some(&PropertyValue::Int(5)));
        assert_eq!(caps.get("UserId"), Some(&PropertyValue::Text("alice".into())));
        assert_eq!(caps.get("FileExtension"), Some(&PropertyValue::Text(".docx".into())));
        assert_eq!(
            caps.get("LastModifiedTime"),
            Some(&PropertyValue::Text("2024-02-03T04:05:06Z".into()))
        );
        assert_eq!(caps.get("UserCanWrite"), Some(&PropertyValue::Bool(true)));
        assert_eq!(caps.get("SupportsLocks"), Some(&PropertyValue::Bool(true)));
        assert_eq!(caps.get("UserInfo"), Some(&PropertyValue::Text("{\"x\":1}".into())));
    }

    #[test]
    fn not_applicable_properties_are_omitted() {
        let grant = AccessGrant::anonymous("tok");
        let caps = resolve(PolicyConfig::default().with_rename(false).with_user_info(false), &grant);

        assert!(!caps.contains("UserCanRename"));
        assert!(!caps.contains("UserInfo"));
        assert!(!caps.contains("CloseUrl"));
        assert!(!caps.contains("DisablePrint"));
        assert!(!caps.contains("ReadOnly"));
        assert_eq!(caps.get("SupportsRename"), Some(&PropertyValue::Bool(false)));

        let json = caps.to_json();
        assert!(json.get("UserCanRename").is_none());
        assert!(json.as_object().unwrap().values().all(|v| !v.is_null()));
    }

    #[test]
    fn default_user_fallback() {
        let grant = AccessGrant::anonymous("tok");
        let caps = resolve(PolicyConfig::default().with_default_user("guest"), &grant);
        assert_eq!(caps.get("UserId"), Some(&PropertyValue::Text("guest".into())));
        assert_eq!(caps.get("UserFriendlyName"), Some(&PropertyValue::Text("guest".into())));
    }

    #[test]
    fn read_only_grant() {
        let grant = AccessGrant::anonymous("tok").read_only();
        let caps = resolve(PolicyConfig::default(), &grant);
        assert_eq!(caps.get("UserCanWrite"), Some(&PropertyValue::Bool(false)));
        assert_eq!(caps.get("UserCanRename"), Some(&PropertyValue::Bool(false)));
        assert_eq!(caps.get("ReadOnly"), Some(&PropertyValue::Bool(true)));
    }

    #[test]
    fn restrictions_and_urls() {
        let policy = PolicyConfig::default()
            .with_restrictions(Restrictions {
                disable_print: Some(true),
                ..Restrictions::default()
            })
            .with_close_url("https://host/close/{id}")
            .with_file_sharing_url("https://host/share/{id}", vec!["ReadOnly".into()]);
        let caps = resolve(policy, &AccessGrant::anonymous("tok"));

        assert_eq!(caps.get("DisablePrint"), Some(&PropertyValue::Bool(true)));
        assert_eq!(
            caps.get("CloseUrl"),
            Some(&PropertyValue::Text("https://host/close/doc-1".into()))
        );
        assert_eq!(
            caps.get("SupportedShareUrlTypes"),
            Some(&PropertyValue::List(vec!["ReadOnly".into()]))
        );
    }

    #[test]
    fn order_follows_table() {
        let caps = resolve(PolicyConfig::default(), &AccessGrant::anonymous("tok"));
        let names: Vec<&str> = caps.iter().map(|(k, _)| k).collect();
        let table: Vec<&str> = PROBES
            .iter()
            .map(|p| p.property)
            .filter(|p| caps.contains(p))
            .collect();
        assert_eq!(names, table);
        assert_eq!(names.first(), Some(&"BaseFileName"));
        assert_eq!(names.last(), Some(&"SupportsExtendedLockLength"));
    }

    #[test]
    fn custom_probe_is_appended() {
        let resolver = CapabilityResolver::new(Arc::new(PolicyConfig::default())).with_probe(Probe {
            property: "BreadcrumbBrandName",
            evaluate: |_| Some(PropertyValue::Text("Host".into())),
        });
        let caps = resolver.resolve(&file(), &AccessGrant::anonymous("tok"), None);
        assert_eq!(caps.iter().last().map(|(k, _)| k), Some("BreadcrumbBrandName"));
    }
}
