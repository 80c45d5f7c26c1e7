//! Command implementations

pub mod backups;
pub mod check;
pub mod reconcile;
pub mod restore;
pub mod uninstall;
pub mod update;
pub mod version;

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use extsync_core::retry::InterventionHandler;
use extsync_core::types::{EditorKind, EngineConfig};
use extsync_core::{EditorPaths, HierarchicalConfigLoader};
use extsync_extensions::{Collaborators, ExtensionUpdater};

/// Resolved configuration and paths for one invocation
pub struct Session {
    pub config: EngineConfig,
    pub paths: EditorPaths,
}

impl Session {
    /// Load config (defaults, file, environment), then apply `--editor`
    pub fn load(config_file: Option<&Utf8Path>, editor: Option<EditorKind>) -> Result<Self> {
        let loader = HierarchicalConfigLoader::new()?;
        let mut config = match config_file {
            Some(file) => loader.load_with_file(file)?,
            None => loader.load()?,
        };
        if let Some(editor) = editor {
            config.editor = editor;
        }

        let paths = EditorPaths::resolve(config.editor, &config.paths)?;
        tracing::debug!(
            editor = %config.editor,
            extensions = %paths.extensions_dir.display(),
            "session loaded"
        );
        Ok(Self { config, paths })
    }

    /// The updater wired to the real registries, editor binary and backup store
    pub fn updater(
        &self,
        intervention: Option<Arc<dyn InterventionHandler>>,
    ) -> Result<ExtensionUpdater> {
        let collaborators = Collaborators::production(&self.config, &self.paths)
            .context("Failed to set up extension services")?;
        Ok(ExtensionUpdater::new(
            &self.config,
            self.paths.clone(),
            collaborators,
            intervention,
        ))
    }
}

/// Prompts are only possible with a terminal on both ends
pub fn interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Normalised id selection; `None` means everything installed
pub fn selection(ids: &[String]) -> Option<Vec<String>> {
    if ids.is_empty() {
        None
    } else {
        Some(ids.iter().map(|id| id.trim().to_lowercase()).collect())
    }
}
