//! Editor bookkeeping file formats
//!
//! The editor keeps two files next to the extension directories:
//! `extensions.json`, an array of [`ExtensionStateEntry`], and `.obsolete`,
//! a map of tombstoned ids. Both are rebuilt by the reconciler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Registry file name inside the extensions directory
pub const REGISTRY_FILE: &str = "extensions.json";

/// Tombstone file name inside the extensions directory
pub const TOMBSTONE_FILE: &str = ".obsolete";

/// Tombstone map: lowercase id -> `true`
pub type TombstoneMap = BTreeMap<String, bool>;

/// One element of `extensions.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionStateEntry {
    pub identifier: ExtensionIdentifier,
    pub version: String,
    pub location: ExtensionLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_location: Option<String>,
    #[serde(default)]
    pub metadata: EntryMetadata,
}

impl ExtensionStateEntry {
    /// Build a fresh entry for an extension living in `dir`
    pub fn for_directory(id: &str, version: &str, dir: &Path, installed_timestamp: i64) -> Self {
        let relative_location = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        Self {
            identifier: ExtensionIdentifier {
                id: id.to_lowercase(),
                uuid: None,
            },
            version: version.to_string(),
            location: ExtensionLocation::file(dir),
            relative_location,
            metadata: EntryMetadata {
                installed_timestamp: Some(installed_timestamp),
                ..Default::default()
            },
        }
    }

    /// True when this entry describes `id` (case-insensitive)
    pub fn is(&self, id: &str) -> bool {
        self.identifier.id.eq_ignore_ascii_case(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionIdentifier {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// URI-shaped location as written by the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionLocation {
    #[serde(rename = "$mid", default = "default_mid")]
    pub mid: u32,
    pub fs_path: String,
    pub path: String,
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

impl ExtensionLocation {
    pub fn file(dir: &Path) -> Self {
        let fs_path = dir.to_string_lossy().into_owned();
        let path = if cfg!(windows) {
            format!("/{}", fs_path.replace('\\', "/"))
        } else {
            fs_path.clone()
        };

        Self {
            mid: default_mid(),
            fs_path,
            path,
            scheme: default_scheme(),
        }
    }
}

fn default_mid() -> u32 {
    1
}
fn default_scheme() -> String {
    "file".to_string()
}

/// Entry metadata; keys extsync does not know are kept verbatim
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_timestamp: Option<i64>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The subset of an extension's `package.json` extsync reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl PackageManifest {
    /// Parse manifest text, returning `None` if it is not a JSON object
    ///
    /// A leading byte-order mark is ignored. Fields of an unexpected type
    /// read as absent instead of rejecting the whole manifest; numbers are
    /// taken as their text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        let object = value.as_object()?;

        let field = |key: &str| match object.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        };

        Some(Self {
            publisher: field("publisher"),
            name: field("name"),
            version: field("version"),
            display_name: field("displayName"),
        })
    }

    /// Read `<dir>/package.json`
    pub fn read_from(dir: &Path) -> Option<Self> {
        let text = std::fs::read_to_string(dir.join("package.json")).ok()?;
        Self::parse(&text)
    }

    /// A manifest that identifies an extension at all
    pub fn has_identity(&self) -> bool {
        non_empty(&self.publisher) || non_empty(&self.name)
    }

    /// `publisher.name`, when both are present
    pub fn id(&self) -> Option<String> {
        match (&self.publisher, &self.name) {
            (Some(p), Some(n)) if !p.is_empty() && !n.is_empty() => Some(format!("{}.{}", p, n)),
            _ => None,
        }
    }

    /// `(id, version)` when the full triple is present
    pub fn identity(&self) -> Option<(String, String)> {
        let version = self.version.as_ref().filter(|v| !v.is_empty())?;
        Some((self.id()?, version.clone()))
    }
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_entry_round_trip_keeps_unknown_metadata() {
        let json = r#"{
            "identifier": {"id": "ms-python.python", "uuid": "f1f59ae4"},
            "version": "2024.1.0",
            "location": {"$mid": 1, "fsPath": "/x/ms-python.python-2024.1.0", "path": "/x/ms-python.python-2024.1.0", "scheme": "file"},
            "relativeLocation": "ms-python.python-2024.1.0",
            "metadata": {"installedTimestamp": 1700000000000, "pinned": true, "source": "gallery", "targetPlatform": "linux-x64"}
        }"#;

        let entry: ExtensionStateEntry = serde_json::from_str(json).unwrap();
        assert!(entry.metadata.pinned);
        assert_eq!(
            entry.metadata.extra.get("targetPlatform"),
            Some(&serde_json::Value::String("linux-x64".into()))
        );

        let out = serde_json::to_string(&entry).unwrap();
        assert!(out.contains("\"$mid\":1"));
        assert!(out.contains("\"targetPlatform\":\"linux-x64\""));
        assert!(out.contains("\"uuid\":\"f1f59ae4\""));
    }

    #[test]
    fn test_manifest_parse_ignores_byte_order_mark() {
        let text = "\u{feff}{\"publisher\": \"pub\", \"name\": \"bom\", \"version\": \"1.0.0\"}";
        let manifest = PackageManifest::parse(text).unwrap();
        assert_eq!(
            manifest.identity(),
            Some(("pub.bom".to_string(), "1.0.0".to_string()))
        );
    }

    #[test]
    fn test_manifest_parse_tolerates_odd_field_types() {
        let text = r#"{"publisher": 1, "name": "ext", "version": "2.0.0", "displayName": ["x"]}"#;
        let manifest = PackageManifest::parse(text).unwrap();
        assert_eq!(manifest.publisher.as_deref(), Some("1"));
        assert_eq!(manifest.display_name, None);
        assert!(manifest.has_identity());

        let text = r#"{"publisher": null, "name": {"nested": true}}"#;
        let manifest = PackageManifest::parse(text).unwrap();
        assert!(!manifest.has_identity());

        assert_eq!(PackageManifest::parse("[1, 2]"), None);
        assert_eq!(PackageManifest::parse("{not json"), None);
    }

    #[test]
    fn test_for_directory_lowercases_id() {
        let dir = PathBuf::from("/ext/Pub.Name-1.0.0");
        let entry = ExtensionStateEntry::for_directory("Pub.Name", "1.0.0", &dir, 42);
        assert_eq!(entry.identifier.id, "pub.name");
        assert_eq!(entry.relative_location.as_deref(), Some("Pub.Name-1.0.0"));
        assert_eq!(entry.metadata.installed_timestamp, Some(42));
        assert!(entry.is("PUB.NAME"));
    }

    #[test]
    fn test_manifest_identity() {
        let m = PackageManifest::parse(r#"{"publisher":"pub","name":"a","version":"1.0.0"}"#)
            .unwrap();
        assert_eq!(m.identity(), Some(("pub.a".into(), "1.0.0".into())));

        let nameless = PackageManifest::parse(r#"{"version":"1.0.0"}"#).unwrap();
        assert!(!nameless.has_identity());
        assert!(nameless.identity().is_none());

        assert!(PackageManifest::parse("[1,2]").is_none());
        assert!(PackageManifest::parse("{oops").is_none());
    }
}
