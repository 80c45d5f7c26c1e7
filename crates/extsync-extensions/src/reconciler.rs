//! On-disk bookkeeping reconciliation
//!
//! The extension directories are the source of truth. `extensions.json`
//! and `.obsolete` are derived from them and rebuilt here, and nowhere
//! else: workers mutate their own directories during a batch, the
//! reconciler runs once after the pool has drained.
//!
//! Corrupt bookkeeping is repaired, never fatal. A second run over its own
//! output writes nothing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use extsync_core::{compare_versions, ParsedVersion};
use extsync_core::types::{
    ExtensionStateEntry, PackageManifest, TombstoneMap, REGISTRY_FILE, TOMBSTONE_FILE,
};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Suffix of the staging directory used by direct installs
pub const STAGING_SUFFIX: &str = ".extsync-tmp";

const TEMP_SUFFIXES: &[&str] = &[".tmp", ".temp", ".partial", ".vsctmp", STAGING_SUFFIX];

static UUID_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("uuid regex is valid")
});

/// Names left behind by interrupted downloads and installs
pub fn is_temp_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    TEMP_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) || UUID_LIKE.is_match(&lower)
}

/// What one reconcile pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// `extensions.json` was missing or not an array
    pub registry_repaired: bool,

    /// `.obsolete` was missing or not an object
    pub tombstones_repaired: bool,

    pub removed_temp: Vec<PathBuf>,

    /// Directories without a usable manifest
    pub removed_invalid: Vec<PathBuf>,

    /// Entries in the rebuilt registry
    pub entries: usize,

    /// Tombstones dropped because the id is installed again
    pub tombstones_cleared: Vec<String>,

    pub registry_written: bool,
    pub tombstones_written: bool,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        self.registry_written
            || self.tombstones_written
            || !self.removed_temp.is_empty()
            || !self.removed_invalid.is_empty()
    }
}

/// Result of removing one extension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallCleanup {
    pub removed_dirs: Vec<PathBuf>,

    /// Registry entry dropped and tombstone written
    pub bookkeeping_updated: bool,
}

/// Rebuilds the registry and tombstone files of one extensions directory
#[derive(Debug, Clone)]
pub struct StateReconciler {
    extensions_dir: PathBuf,
}

impl StateReconciler {
    pub fn new(extensions_dir: impl Into<PathBuf>) -> Self {
        Self {
            extensions_dir: extensions_dir.into(),
        }
    }

    pub fn extensions_dir(&self) -> &Path {
        &self.extensions_dir
    }

    pub fn registry_path(&self) -> PathBuf {
        self.extensions_dir.join(REGISTRY_FILE)
    }

    pub fn tombstone_path(&self) -> PathBuf {
        self.extensions_dir.join(TOMBSTONE_FILE)
    }

    /// Bring both bookkeeping files in line with the directories on disk
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        if !self.extensions_dir.exists() {
            std::fs::create_dir_all(&self.extensions_dir)?;
        }

        let (existing, registry_text) = self.load_registry(&mut report);
        let (mut tombstones, tombstone_text) = self.load_tombstones(&mut report);

        let mut dirs = Vec::new();
        for entry in self.sorted_entries()? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == REGISTRY_FILE || name == TOMBSTONE_FILE {
                continue;
            }

            let is_dir = path.is_dir();
            // Temp entries holding a manifest may belong to a running install;
            // they are left alone but never registered
            if is_temp_name(&name) {
                let has_manifest = is_dir && path.join("package.json").is_file();
                if !has_manifest && remove_path(&path, is_dir) {
                    report.removed_temp.push(path);
                }
                continue;
            }

            if !is_dir || name.starts_with('.') {
                continue;
            }

            match PackageManifest::read_from(&path) {
                Some(manifest) if manifest.has_identity() => dirs.push((path, manifest)),
                _ => {
                    warn!(
                        dir = %path.display(),
                        "removing extension directory without a usable manifest"
                    );
                    if remove_path(&path, true) {
                        report.removed_invalid.push(path);
                    }
                }
            }
        }

        let entries = rebuild_entries(&dirs, &existing);
        let installed: HashSet<String> = entries.iter().map(|e| e.identifier.id.clone()).collect();
        report.entries = entries.len();

        let before = tombstones.len();
        tombstones.retain(|id, _| {
            let keep = !installed.contains(&id.to_lowercase());
            if !keep {
                report.tombstones_cleared.push(id.clone());
            }
            keep
        });
        if tombstones.len() != before {
            debug!(
                cleared = ?report.tombstones_cleared,
                "clearing tombstones of installed extensions"
            );
        }

        let registry_json = serde_json::to_string(&entries)
            .map_err(|e| EngineError::reconcile(&self.registry_path(), e))?;
        if registry_text.as_deref() != Some(registry_json.as_str()) {
            write_atomically(&self.registry_path(), &registry_json)?;
            report.registry_written = true;
        }

        let tombstone_json = serde_json::to_string(&tombstones)
            .map_err(|e| EngineError::reconcile(&self.tombstone_path(), e))?;
        if tombstone_text.as_deref() != Some(tombstone_json.as_str()) {
            write_atomically(&self.tombstone_path(), &tombstone_json)?;
            report.tombstones_written = true;
        }

        if report.changed() {
            info!(
                entries = report.entries,
                removed_temp = report.removed_temp.len(),
                removed_invalid = report.removed_invalid.len(),
                repaired = report.registry_repaired || report.tombstones_repaired,
                "extension state reconciled"
            );
        } else {
            debug!(entries = report.entries, "extension state already consistent");
        }

        Ok(report)
    }

    /// Every directory belonging to `id` (case-insensitive)
    ///
    /// A directory whose manifest names an extension belongs to that
    /// extension only. Without a readable id the name decides: `id` itself,
    /// or `id-<version>`. Temp and staging entries are never included.
    pub fn directories_for(&self, id: &str) -> Result<Vec<PathBuf>> {
        let id = id.to_lowercase();
        let prefix = format!("{}-", id);
        let mut found = Vec::new();

        if !self.extensions_dir.exists() {
            return Ok(found);
        }

        for entry in self.sorted_entries()? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if is_temp_name(&name) {
                continue;
            }

            let belongs = match PackageManifest::read_from(&path).and_then(|m| m.id()) {
                Some(manifest_id) => manifest_id.eq_ignore_ascii_case(&id),
                None => {
                    name == id
                        || name
                            .strip_prefix(&prefix)
                            .is_some_and(|rest| ParsedVersion::parse(rest).is_some())
                }
            };
            if belongs {
                found.push(path);
            }
        }

        Ok(found)
    }

    /// Delete every directory of `id`; this is the authoritative part of an uninstall
    pub fn remove_directories(&self, id: &str) -> Result<Vec<PathBuf>> {
        let dirs = self.directories_for(id)?;
        for dir in &dirs {
            std::fs::remove_dir_all(dir).map_err(|e| EngineError::reconcile(dir, e))?;
            debug!(id = %id, dir = %dir.display(), "removed extension directory");
        }
        Ok(dirs)
    }

    /// Drop registry entries for `ids` and tombstone them
    pub fn forget(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut report = ReconcileReport::default();

        let (mut entries, _) = self.load_registry(&mut report);
        entries.retain(|entry| !ids.iter().any(|id| entry.is(id)));
        let registry_json = serde_json::to_string(&entries)
            .map_err(|e| EngineError::reconcile(&self.registry_path(), e))?;
        write_atomically(&self.registry_path(), &registry_json)?;

        let (mut tombstones, _) = self.load_tombstones(&mut report);
        for id in ids {
            tombstones.insert(id.to_lowercase(), true);
        }
        let tombstone_json = serde_json::to_string(&tombstones)
            .map_err(|e| EngineError::reconcile(&self.tombstone_path(), e))?;
        write_atomically(&self.tombstone_path(), &tombstone_json)?;

        debug!(ids = ?ids, "registry entries dropped and tombstoned");
        Ok(())
    }

    /// Remove `id` from disk, then update the bookkeeping best-effort
    ///
    /// Only a failure to delete a directory fails the uninstall.
    pub fn uninstall(&self, id: &str) -> Result<UninstallCleanup> {
        let removed_dirs = self.remove_directories(id)?;

        let bookkeeping_updated = match self.forget(&[id.to_string()]) {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %id, error = %e, "failed to update bookkeeping after uninstall");
                false
            }
        };

        Ok(UninstallCleanup {
            removed_dirs,
            bookkeeping_updated,
        })
    }

    fn sorted_entries(&self) -> Result<Vec<std::fs::DirEntry>> {
        let mut entries = std::fs::read_dir(&self.extensions_dir)
            .map_err(|e| EngineError::reconcile(&self.extensions_dir, e))?
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());
        Ok(entries)
    }

    /// Current entries plus the raw text; corrupt or missing files yield none
    fn load_registry(
        &self,
        report: &mut ReconcileReport,
    ) -> (Vec<ExtensionStateEntry>, Option<String>) {
        let path = self.registry_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "unreadable registry; recreating");
                }
                report.registry_repaired = true;
                return (Vec::new(), None);
            }
        };

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(serde_json::Value::Array(items)) => {
                let entries = items
                    .into_iter()
                    .filter_map(|item| match serde_json::from_value(item) {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            debug!(error = %e, "dropping malformed registry entry");
                            None
                        }
                    })
                    .collect();
                (entries, Some(text))
            }
            _ => {
                warn!(path = %path.display(), "registry is not a JSON array; recreating");
                report.registry_repaired = true;
                (Vec::new(), Some(text))
            }
        }
    }

    fn load_tombstones(&self, report: &mut ReconcileReport) -> (TombstoneMap, Option<String>) {
        let path = self.tombstone_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "unreadable tombstones; recreating");
                }
                report.tombstones_repaired = true;
                return (TombstoneMap::new(), None);
            }
        };

        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(serde_json::Value::Object(map)) => {
                let tombstones = map
                    .into_iter()
                    .map(|(id, flag)| (id, flag.as_bool().unwrap_or(true)))
                    .collect();
                (tombstones, Some(text))
            }
            _ => {
                warn!(path = %path.display(), "tombstones are not a JSON object; recreating");
                report.tombstones_repaired = true;
                (TombstoneMap::new(), Some(text))
            }
        }
    }
}

/// One entry per valid `(id, version)`, sorted by id then version
///
/// Metadata of an existing entry with the same id and version carries over;
/// new entries are stamped with the directory's modification time.
fn rebuild_entries(
    dirs: &[(PathBuf, PackageManifest)],
    existing: &[ExtensionStateEntry],
) -> Vec<ExtensionStateEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for (dir, manifest) in dirs {
        let Some((id, version)) = manifest.identity() else {
            debug!(dir = %dir.display(), "manifest has no version; not registered");
            continue;
        };
        if !seen.insert((id.to_lowercase(), version.clone())) {
            continue;
        }

        let mut entry =
            ExtensionStateEntry::for_directory(&id, &version, dir, modified_millis(dir));
        if let Some(previous) = existing
            .iter()
            .find(|e| e.is(&id) && e.version == version)
        {
            entry.identifier.uuid = previous.identifier.uuid.clone();
            entry.metadata = previous.metadata.clone();
        }
        entries.push(entry);
    }

    entries.sort_by(|a, b| {
        a.identifier.id.cmp(&b.identifier.id).then_with(|| {
            compare_versions(&a.version, &b.version).unwrap_or_else(|| a.version.cmp(&b.version))
        })
    });
    entries
}

fn modified_millis(dir: &Path) -> i64 {
    std::fs::metadata(dir)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
}

fn remove_path(path: &Path, is_dir: bool) -> bool {
    let result = if is_dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => {
            debug!(path = %path.display(), "removed stray entry");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove stray entry");
            false
        }
    }
}

/// Write through a sibling file and rename over the target
fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let staging = path.with_file_name(format!(
        "{}{}",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        STAGING_SUFFIX
    ));
    std::fs::write(&staging, content).map_err(|e| EngineError::reconcile(path, e))?;
    std::fs::rename(&staging, path).map_err(|e| EngineError::reconcile(path, e))?;
    Ok(())
}
