//! Release documents carried by a midstream version.
//!
//! Documents are YAML with `apiVersion`/`kind` headers. Parsing never fails: anything
//! that is not a recognized kind, or does not match its schema, becomes
//! [`ReleaseDocument::Unknown`] with the reason attached.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group that owns the release document kinds.
pub const KOTS_API_GROUP: &str = "kots.io/";

/// A parsed release document.
#[derive(Clone, Debug, PartialEq)]
pub enum ReleaseDocument {
    Config(ConfigSpec),
    ConfigValues(ConfigValuesSpec),
    Installation(InstallationSpec),
    Application(ApplicationSpec),
    Unknown {
        api_version: Option<String>,
        kind: Option<String>,
        reason: String,
    },
}

/// Configuration screen definition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSpec {
    #[serde(default)]
    pub groups: Vec<ConfigGroup>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigGroup {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub items: Vec<ConfigItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

/// Values supplied for config items.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigValuesSpec {
    #[serde(default)]
    pub values: BTreeMap<String, ConfigValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigValue {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub default: Option<String>,
}

/// Upstream metadata recorded at render time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    #[serde(default)]
    pub update_cursor: Option<String>,
    #[serde(default)]
    pub channel_name: Option<String>,
    #[serde(default)]
    pub version_label: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub encryption_key: Option<String>,
}

/// Vendor-facing application metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    spec: Option<T>,
}

impl ReleaseDocument {
    /// Parse one YAML document.
    pub fn parse(raw: &str) -> Self {
        let header: Header = match serde_yaml::from_str(raw) {
            Ok(header) => header,
            Err(e) => {
                return Self::Unknown {
                    api_version: None,
                    kind: None,
                    reason: format!("invalid yaml: {e}"),
                };
            }
        };

        let unknown = |reason: String| Self::Unknown {
            api_version: header.api_version.clone(),
            kind: header.kind.clone(),
            reason,
        };

        let in_group = header
            .api_version
            .as_deref()
            .is_some_and(|v| v.starts_with(KOTS_API_GROUP));
        if !in_group {
            return unknown("not a kots.io document".to_string());
        }

        match header.kind.as_deref() {
            Some("Config") => spec_of(raw).map_or_else(unknown, Self::Config),
            Some("ConfigValues") => spec_of(raw).map_or_else(unknown, Self::ConfigValues),
            Some("Installation") => spec_of(raw).map_or_else(unknown, Self::Installation),
            Some("Application") => spec_of(raw).map_or_else(unknown, Self::Application),
            Some(other) => unknown(format!("unsupported kind {other}")),
            None => unknown("missing kind".to_string()),
        }
    }

    /// Parse an optional stored blob, treating empty text as absent.
    pub fn parse_optional(raw: Option<&str>) -> Option<Self> {
        raw.filter(|r| !r.trim().is_empty()).map(Self::parse)
    }

    pub fn as_application(&self) -> Option<&ApplicationSpec> {
        match self {
            Self::Application(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown { .. })
    }
}

fn spec_of<T: DeserializeOwned + Default>(raw: &str) -> Result<T, String> {
    serde_yaml::from_str::<Envelope<T>>(raw)
        .map(|envelope| envelope.spec.unwrap_or_default())
        .map_err(|e| format!("invalid spec: {e}"))
}
