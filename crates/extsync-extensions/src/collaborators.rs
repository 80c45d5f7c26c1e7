//! Collaborator seams
//!
//! The engine talks to the outside world only through these traits. Each is
//! injected as an `Arc<dyn ...>` so tests can substitute fakes; the
//! production implementations live in [`crate::registry_client`],
//! [`crate::editor_cli`], [`crate::backup`] and [`crate::installed`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use extsync_core::types::{BackupRef, EditorKind, InstalledItem, RegistrySource};
use extsync_core::{EditorPaths, ErrorKind, OperationError};

/// Remote registry (Open VSX or the Marketplace)
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Latest published version of `id` on `source`
    async fn resolve_latest_version(
        &self,
        id: &str,
        prefer_prerelease: bool,
        source: RegistrySource,
    ) -> Result<String, OperationError>;

    /// Download the package for `id@version` and return its local path
    async fn fetch(
        &self,
        id: &str,
        version: &str,
        source: RegistrySource,
    ) -> Result<PathBuf, OperationError>;
}

/// Options passed to [`EditorCli::install`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallOptions {
    pub force_reinstall: bool,
    pub timeout: Duration,
}

/// What the editor CLI reported for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutput {
    pub success: bool,
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CliOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Most useful failure text: explicit error, then stderr, then stdout
    pub fn failure_text(&self) -> String {
        let candidates = [
            self.error.as_deref().unwrap_or_default(),
            self.stderr.trim(),
            self.stdout.trim(),
        ];
        match candidates.iter().find(|s| !s.is_empty()) {
            Some(text) => text.to_string(),
            None => match self.exit_code {
                Some(code) => format!("editor CLI failed with exit code {}", code),
                None => "editor CLI failed".to_string(),
            },
        }
    }

    /// Classify a failed install; unrecognised text counts as an install failure
    pub fn install_error(&self) -> OperationError {
        OperationError::classify_or(self.failure_text(), ErrorKind::Install)
    }
}

/// The editor's command-line binary
#[async_trait]
pub trait EditorCli: Send + Sync {
    async fn install(&self, binary: &Path, file: &Path, options: InstallOptions) -> CliOutput;

    async fn uninstall(&self, binary: &Path, id: &str) -> CliOutput;
}

/// Snapshot of an installed extension taken before it is replaced
#[async_trait]
pub trait BackupService: Send + Sync {
    async fn backup(
        &self,
        install_path: &Path,
        id: &str,
        version: &str,
        editor: EditorKind,
        note: Option<&str>,
    ) -> anyhow::Result<BackupRef>;
}

/// Lists what is currently installed for one editor
#[async_trait]
pub trait InstalledSource: Send + Sync {
    async fn list_installed(&self, paths: &EditorPaths) -> anyhow::Result<Vec<InstalledItem>>;
}
