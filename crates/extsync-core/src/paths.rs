//! Editor path resolution
//!
//! Every component receives one [`EditorPaths`] value, resolved once per
//! batch, instead of rebuilding paths from the home directory on its own.

use crate::error::{Error, Result};
use crate::types::{EditorKind, PathOverrides};
use std::path::{Path, PathBuf};

/// Get the user's home directory
///
/// Prefers the HOME environment variable over dirs::home_dir() so that
/// sandboxed shells and test harnesses can redirect it.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    dirs::home_dir().ok_or(Error::NoHomeDir)
}

/// Filesystem locations used while operating on one editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorPaths {
    /// Which editor these paths belong to
    pub editor: EditorKind,

    /// Directory holding one sub-directory per installed extension
    pub extensions_dir: PathBuf,

    /// Editor CLI binary (name looked up on PATH, or an absolute path)
    pub binary: PathBuf,

    /// Where extension backups are written
    pub backup_dir: PathBuf,

    /// Where fetched VSIX packages are stored
    pub download_dir: PathBuf,
}

impl EditorPaths {
    /// Resolve paths for `editor` under the current user's home directory
    pub fn resolve(editor: EditorKind, overrides: &PathOverrides) -> Result<Self> {
        let home = get_home_dir()?;
        Ok(Self::resolve_in(&home, editor, overrides))
    }

    /// Resolve paths for `editor` under an explicit home directory
    pub fn resolve_in(home: &Path, editor: EditorKind, overrides: &PathOverrides) -> Self {
        let data_dir = home.join(".extsync");

        Self {
            editor,
            extensions_dir: overrides
                .extensions_dir
                .clone()
                .unwrap_or_else(|| home.join(editor.extensions_subdir())),
            binary: overrides
                .binary
                .clone()
                .unwrap_or_else(|| PathBuf::from(editor.binary_name())),
            backup_dir: overrides
                .backup_dir
                .clone()
                .unwrap_or_else(|| data_dir.join("backups").join(editor.to_string())),
            download_dir: overrides
                .download_dir
                .clone()
                .unwrap_or_else(|| data_dir.join("downloads")),
        }
    }

    /// Build paths rooted at an arbitrary directory (tests, portable installs)
    pub fn rooted(root: &Path, editor: EditorKind) -> Self {
        Self {
            editor,
            extensions_dir: root.join("extensions"),
            binary: PathBuf::from(editor.binary_name()),
            backup_dir: root.join("backups"),
            download_dir: root.join("downloads"),
        }
    }
}
