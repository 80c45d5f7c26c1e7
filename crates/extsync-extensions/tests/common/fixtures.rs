//! On-disk fixtures: extension directories, VSIX packages, plans
//!
//! Everything lives in a `TempDir` owned by [`ExtensionsFixture`], laid out
//! like `EditorPaths::rooted` expects.

#![allow(dead_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use extsync_core::retry::{InterventionHandler, RetryChain};
use extsync_core::types::{
    ChangePlan, EditorKind, ExtensionStateEntry, RetryPolicy, RetryStrategy, TombstoneMap,
};
use extsync_core::EditorPaths;
use extsync_extensions::CoordinatorOptions;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// A throwaway editor installation
pub struct ExtensionsFixture {
    temp_dir: TempDir,
    paths: EditorPaths,
}

impl ExtensionsFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let paths = EditorPaths::rooted(temp_dir.path(), EditorKind::Vscode);
        std::fs::create_dir_all(&paths.extensions_dir).unwrap();
        std::fs::create_dir_all(&paths.download_dir).unwrap();
        Self { temp_dir, paths }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn paths(&self) -> &EditorPaths {
        &self.paths
    }

    pub fn extensions_dir(&self) -> &Path {
        &self.paths.extensions_dir
    }

    pub fn download_dir(&self) -> &Path {
        &self.paths.download_dir
    }

    /// `<extensions>/<id>-<version>` with a matching `package.json`
    pub fn install(&self, id: &str, version: &str) -> PathBuf {
        let dir = self
            .extensions_dir()
            .join(format!("{}-{}", id.to_lowercase(), version));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("package.json"), manifest_json(id, version)).unwrap();
        dir
    }

    /// A directory under the extensions dir with arbitrary `package.json` text
    pub fn install_raw(&self, dir_name: &str, package_json: Option<&str>) -> PathBuf {
        let dir = self.extensions_dir().join(dir_name);
        std::fs::create_dir_all(&dir).unwrap();
        if let Some(text) = package_json {
            std::fs::write(dir.join("package.json"), text).unwrap();
        }
        dir
    }

    pub fn registry_path(&self) -> PathBuf {
        self.extensions_dir().join("extensions.json")
    }

    pub fn tombstone_path(&self) -> PathBuf {
        self.extensions_dir().join(".obsolete")
    }

    pub fn read_registry(&self) -> Vec<ExtensionStateEntry> {
        let text = std::fs::read_to_string(self.registry_path()).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    pub fn read_tombstones(&self) -> TombstoneMap {
        let text = std::fs::read_to_string(self.tombstone_path()).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    /// Directory names under the extensions dir, sorted
    pub fn dir_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.extensions_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for ExtensionsFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// `package.json` for `publisher.name` at `version`
pub fn manifest_json(id: &str, version: &str) -> String {
    let (publisher, name) = id.split_once('.').unwrap_or((id, id));
    serde_json::json!({
        "publisher": publisher,
        "name": name,
        "version": version,
        "displayName": format!("{} test extension", name),
    })
    .to_string()
}

/// Write a minimal VSIX for `id@version` at `path`
pub fn write_vsix(path: &Path, id: &str, version: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();

    zip.start_file("extension.vsixmanifest", options).unwrap();
    zip.write_all(b"<PackageManifest/>").unwrap();
    zip.start_file("extension/package.json", options).unwrap();
    zip.write_all(manifest_json(id, version).as_bytes()).unwrap();
    zip.start_file("extension/out/main.js", options).unwrap();
    zip.write_all(b"exports.activate = () => {};").unwrap();
    zip.finish().unwrap();
}

/// `(id, version)` from the payload manifest of a VSIX
pub fn read_vsix_identity(path: &Path) -> Option<(String, String)> {
    let mut archive = zip::ZipArchive::new(File::open(path).ok()?).ok()?;
    let mut entry = archive.by_name("extension/package.json").ok()?;
    let mut text = String::new();
    entry.read_to_string(&mut text).ok()?;
    extsync_core::types::PackageManifest::parse(&text)?.identity()
}

pub fn change_plan(id: &str, current: &str, target: &str) -> ChangePlan {
    ChangePlan {
        id: id.to_string(),
        current_version: current.to_string(),
        target_version: target.to_string(),
        forced: false,
        install_path: None,
    }
}

/// Backoff short enough for tests
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        strategy: RetryStrategy::ExponentialBackoff,
        backoff_multiplier: 2.0,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        jitter: false,
    }
}

/// The standard chain with test backoff
pub fn fast_chain(intervention: Option<Arc<dyn InterventionHandler>>) -> RetryChain {
    RetryChain::builder()
        .with_standard_strategies(fast_policy(), intervention)
        .build()
}

/// Unattended, single source, generous deadline
pub fn test_options() -> CoordinatorOptions {
    CoordinatorOptions {
        concurrency: 2,
        unattended: true,
        install_timeout: Duration::from_secs(10),
        source_fallback: false,
        ..Default::default()
    }
}
