//! Installed extension discovery
//!
//! Lists what an editor has installed by reading the `package.json` of every
//! directory under its extensions directory. Staging leftovers, dotfiles and
//! directories without a complete `publisher`/`name`/`version` are ignored;
//! cleaning those up is the reconciler's job.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use extsync_core::types::{InstalledItem, PackageManifest};
use extsync_core::EditorPaths;
use tracing::debug;

use crate::collaborators::InstalledSource;
use crate::reconciler::is_temp_name;

/// [`InstalledSource`] that scans extension manifests on disk
#[derive(Debug, Clone, Default)]
pub struct ManifestScanner;

impl ManifestScanner {
    pub fn new() -> Self {
        Self
    }

    /// Blocking scan of `extensions_dir`, sorted by directory name
    pub fn scan(extensions_dir: &Path) -> anyhow::Result<Vec<InstalledItem>> {
        if !extensions_dir.exists() {
            debug!(dir = %extensions_dir.display(), "extensions directory does not exist");
            return Ok(Vec::new());
        }

        let mut entries: Vec<_> = std::fs::read_dir(extensions_dir)
            .with_context(|| format!("Failed to read {}", extensions_dir.display()))?
            .filter_map(|entry| entry.ok())
            .collect();
        entries.sort_by_key(|entry| entry.file_name());

        let mut items = Vec::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            if name.starts_with('.') || is_temp_name(&name) || !path.is_dir() {
                continue;
            }

            match PackageManifest::read_from(&path).and_then(|m| m.identity()) {
                Some((id, version)) => {
                    items.push(InstalledItem::new(id, version).with_install_path(&path))
                }
                None => debug!(dir = %path.display(), "no usable manifest; ignoring"),
            }
        }

        debug!(
            dir = %extensions_dir.display(),
            count = items.len(),
            "scanned installed extensions"
        );
        Ok(items)
    }
}

#[async_trait]
impl InstalledSource for ManifestScanner {
    async fn list_installed(&self, paths: &EditorPaths) -> anyhow::Result<Vec<InstalledItem>> {
        let dir = paths.extensions_dir.clone();
        tokio::task::spawn_blocking(move || Self::scan(&dir))
            .await
            .context("Installed extension scan panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(root: &Path, dir: &str, body: &str) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("package.json"), body).unwrap();
    }

    #[test]
    fn test_scan_reads_manifests_and_skips_noise() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_manifest(
            root,
            "pub.b-2.0.0",
            r#"{"publisher":"pub","name":"b","version":"2.0.0"}"#,
        );
        write_manifest(
            root,
            "pub.a-1.0.0",
            r#"{"publisher":"pub","name":"a","version":"1.0.0"}"#,
        );
        write_manifest(
            root,
            "pub.c-1.0.0.extsync-tmp",
            r#"{"publisher":"pub","name":"c","version":"1.0.0"}"#,
        );
        write_manifest(root, ".hidden", r#"{"publisher":"x","name":"y","version":"1"}"#);
        write_manifest(root, "broken", "not json");
        std::fs::write(root.join("extensions.json"), "[]").unwrap();

        let items = ManifestScanner::scan(root).unwrap();
        let ids: Vec<_> = items.iter().map(|i| (i.id.as_str(), i.version.as_str())).collect();
        assert_eq!(ids, vec![("pub.a", "1.0.0"), ("pub.b", "2.0.0")]);
        assert_eq!(
            items[0].install_path.as_deref(),
            Some(root.join("pub.a-1.0.0").as_path())
        );
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let items = ManifestScanner::scan(&temp.path().join("nope")).unwrap();
        assert!(items.is_empty());
    }
}
