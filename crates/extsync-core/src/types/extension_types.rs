//! Extension, plan and outcome types shared across the engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::Error;

/// Editors whose extension directories extsync knows how to manage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditorKind {
    #[default]
    Vscode,
    VscodeInsiders,
    Cursor,
    Windsurf,
    Vscodium,
}

impl EditorKind {
    /// Extension directory relative to the home directory
    pub fn extensions_subdir(self) -> &'static str {
        match self {
            EditorKind::Vscode => ".vscode/extensions",
            EditorKind::VscodeInsiders => ".vscode-insiders/extensions",
            EditorKind::Cursor => ".cursor/extensions",
            EditorKind::Windsurf => ".windsurf/extensions",
            EditorKind::Vscodium => ".vscode-oss/extensions",
        }
    }

    /// CLI binary shipped with the editor
    pub fn binary_name(self) -> &'static str {
        match self {
            EditorKind::Vscode => "code",
            EditorKind::VscodeInsiders => "code-insiders",
            EditorKind::Cursor => "cursor",
            EditorKind::Windsurf => "windsurf",
            EditorKind::Vscodium => "codium",
        }
    }

    /// Registry the editor talks to by default
    pub fn default_source(self) -> RegistrySource {
        match self {
            EditorKind::Vscode | EditorKind::VscodeInsiders => RegistrySource::Marketplace,
            EditorKind::Cursor | EditorKind::Windsurf | EditorKind::Vscodium => {
                RegistrySource::OpenVsx
            }
        }
    }
}

impl fmt::Display for EditorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EditorKind::Vscode => "vscode",
            EditorKind::VscodeInsiders => "vscode-insiders",
            EditorKind::Cursor => "cursor",
            EditorKind::Windsurf => "windsurf",
            EditorKind::Vscodium => "vscodium",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EditorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vscode" | "code" => Ok(EditorKind::Vscode),
            "vscode-insiders" | "insiders" | "code-insiders" => Ok(EditorKind::VscodeInsiders),
            "cursor" => Ok(EditorKind::Cursor),
            "windsurf" => Ok(EditorKind::Windsurf),
            "vscodium" | "codium" => Ok(EditorKind::Vscodium),
            _ => Err(Error::invalid_editor(s)),
        }
    }
}

/// Remote registry an extension can be resolved and fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrySource {
    OpenVsx,
    Marketplace,
}

impl RegistrySource {
    /// The other registry
    pub fn alternate(self) -> Self {
        match self {
            RegistrySource::OpenVsx => RegistrySource::Marketplace,
            RegistrySource::Marketplace => RegistrySource::OpenVsx,
        }
    }

    /// Sources to try, in preference order
    pub fn preference_order(self, fallback: bool) -> Vec<Self> {
        if fallback {
            vec![self, self.alternate()]
        } else {
            vec![self]
        }
    }
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrySource::OpenVsx => write!(f, "open-vsx"),
            RegistrySource::Marketplace => write!(f, "marketplace"),
        }
    }
}

impl FromStr for RegistrySource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open-vsx" | "openvsx" | "ovsx" => Ok(RegistrySource::OpenVsx),
            "marketplace" | "vs-marketplace" | "gallery" => Ok(RegistrySource::Marketplace),
            _ => Err(Error::invalid_config(format!("Unknown registry source: {}", s))),
        }
    }
}

/// Check that `id` has the `publisher.name` shape
pub fn is_valid_extension_id(id: &str) -> bool {
    let Some((publisher, name)) = id.split_once('.') else {
        return false;
    };
    let valid_part = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    };
    valid_part(publisher) && !publisher.contains('.') && valid_part(name)
}

/// An extension currently present in the editor's extension directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledItem {
    /// `publisher.name`
    pub id: String,

    /// Installed version
    pub version: String,

    /// Directory the extension lives in, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
}

impl InstalledItem {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            install_path: None,
        }
    }

    pub fn with_install_path(mut self, path: impl AsRef<Path>) -> Self {
        self.install_path = Some(path.as_ref().to_path_buf());
        self
    }
}

/// Decision that an installed extension must move to `target_version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePlan {
    pub id: String,
    pub current_version: String,
    pub target_version: String,

    /// Planned because the user selected it, regardless of version delta
    #[serde(default)]
    pub forced: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<PathBuf>,
}

/// Terminal status of one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitStatus {
    Updated,
    UpToDate,
    Skipped,
    Failed,
    Removed,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitStatus::Updated => "updated",
            UnitStatus::UpToDate => "up-to-date",
            UnitStatus::Skipped => "skipped",
            UnitStatus::Failed => "failed",
            UnitStatus::Removed => "removed",
        };
        write!(f, "{}", s)
    }
}

/// Opaque handle to a backup, as returned by the backup collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackupRef(pub String);

impl fmt::Display for BackupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal record for one planned item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitOutcome {
    pub id: String,
    pub status: UnitStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub elapsed_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_ref: Option<BackupRef>,

    /// Version the item ended up at (or was targeted at)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Attempts made by the retry chain
    #[serde(default)]
    pub attempts: u32,

    /// Last recovery strategy applied, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    /// Why an item was skipped (dry run, download only, batch aborted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl UnitOutcome {
    pub fn new(id: impl Into<String>, status: UnitStatus) -> Self {
        Self {
            id: id.into(),
            status,
            error: None,
            elapsed_ms: 0,
            backup_ref: None,
            version: None,
            attempts: 0,
            strategy: None,
            note: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(id, UnitStatus::Failed)
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Result of a whole batch, returned to the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_detected: usize,
    pub up_to_date: usize,
    pub to_update: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(default)]
    pub removed: usize,
    pub items: Vec<UnitOutcome>,
    pub backups: Vec<BackupRef>,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub dry_run: bool,
}

impl Summary {
    /// Append an outcome and update the counters
    pub fn record(&mut self, outcome: UnitOutcome) {
        match outcome.status {
            UnitStatus::Updated => self.updated += 1,
            UnitStatus::UpToDate => self.up_to_date += 1,
            UnitStatus::Skipped => self.skipped += 1,
            UnitStatus::Failed => self.failed += 1,
            UnitStatus::Removed => self.removed += 1,
        }
        if let Some(backup) = &outcome.backup_ref {
            self.backups.push(backup.clone());
        }
        self.items.push(outcome);
    }

    /// Outcomes with the given status
    pub fn with_status(&self, status: UnitStatus) -> impl Iterator<Item = &UnitOutcome> {
        self.items.iter().filter(move |o| o.status == status)
    }

    /// Ids that failed, for re-running the failed subset
    pub fn failed_ids(&self) -> Vec<String> {
        self.with_status(UnitStatus::Failed)
            .map(|o| o.id.clone())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Persist the summary as pretty JSON for later auditing
    pub fn write_json(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_extension_ids() {
        assert!(is_valid_extension_id("ms-python.python"));
        assert!(is_valid_extension_id("rust-lang.rust-analyzer"));
        assert!(is_valid_extension_id("pub.name.with.dots"));
        assert!(!is_valid_extension_id("nodot"));
        assert!(!is_valid_extension_id(".name"));
        assert!(!is_valid_extension_id("pub."));
        assert!(!is_valid_extension_id("pub lisher.name"));
    }

    #[test]
    fn test_editor_kind_round_trip_names() {
        for editor in [
            EditorKind::Vscode,
            EditorKind::VscodeInsiders,
            EditorKind::Cursor,
            EditorKind::Windsurf,
            EditorKind::Vscodium,
        ] {
            assert_eq!(editor.to_string().parse::<EditorKind>().unwrap(), editor);
        }
        assert!("sublime".parse::<EditorKind>().is_err());
    }

    #[test]
    fn test_source_preference_order() {
        assert_eq!(
            RegistrySource::OpenVsx.preference_order(true),
            vec![RegistrySource::OpenVsx, RegistrySource::Marketplace]
        );
        assert_eq!(
            RegistrySource::Marketplace.preference_order(false),
            vec![RegistrySource::Marketplace]
        );
    }

    #[test]
    fn test_summary_record_counts() {
        let mut summary = Summary::default();
        summary.record(UnitOutcome::new("a.b", UnitStatus::Updated));
        let mut with_backup = UnitOutcome::new("a.c", UnitStatus::Updated);
        with_backup.backup_ref = Some(BackupRef("bk-1".into()));
        summary.record(with_backup);
        summary.record(UnitOutcome::failed("a.d", "boom"));

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.backups, vec![BackupRef("bk-1".into())]);
        assert_eq!(summary.failed_ids(), vec!["a.d".to_string()]);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_outcome_serializes_camel_case() {
        let outcome = UnitOutcome::new("a.b", UnitStatus::UpToDate).with_elapsed_ms(12);
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"upToDate\""));
        assert!(json.contains("\"elapsedMs\":12"));
        assert!(!json.contains("backupRef"));
    }

    #[test]
    fn test_summary_write_json() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("reports/summary.json");
        let summary = Summary {
            total_detected: 3,
            ..Default::default()
        };
        summary.write_json(&path).unwrap();

        let loaded: Summary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.total_detected, 3);
    }
}
