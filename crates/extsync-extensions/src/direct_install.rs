//! Direct installation of a VSIX package
//!
//! Used when the editor CLI keeps failing: the `extension/` folder of the
//! package is unpacked into `<name>.extsync-tmp` next to the final
//! directory and renamed into place, so a half-written directory never
//! carries a valid extension name. Bookkeeping is left to the reconciler.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use extsync_core::types::PackageManifest;
use extsync_core::{ErrorKind, OperationError};
use tracing::{debug, info};

use crate::reconciler::STAGING_SUFFIX;

/// Prefix of the payload inside a VSIX archive
const PAYLOAD_PREFIX: &str = "extension/";

/// Unpacks VSIX packages straight into an extensions directory
#[derive(Debug, Clone)]
pub struct DirectInstaller {
    extensions_dir: PathBuf,
}

impl DirectInstaller {
    pub fn new(extensions_dir: impl Into<PathBuf>) -> Self {
        Self {
            extensions_dir: extensions_dir.into(),
        }
    }

    /// `<extensions_dir>/<id>-<version>` with the id lowercased
    pub fn target_dir(&self, id: &str, version: &str) -> PathBuf {
        self.extensions_dir
            .join(format!("{}-{}", id.to_lowercase(), version))
    }

    /// Install `vsix` as `id@version` without going through the editor
    pub async fn install(
        &self,
        vsix: &Path,
        id: &str,
        version: &str,
    ) -> Result<PathBuf, OperationError> {
        let installer = self.clone();
        let (vsix, id, version) = (vsix.to_path_buf(), id.to_string(), version.to_string());

        tokio::task::spawn_blocking(move || installer.install_blocking(&vsix, &id, &version))
            .await
            .map_err(|e| OperationError::install(format!("direct install task failed: {}", e)))?
    }

    /// Synchronous body of [`install`](Self::install)
    pub fn install_blocking(
        &self,
        vsix: &Path,
        id: &str,
        version: &str,
    ) -> Result<PathBuf, OperationError> {
        let target = self.target_dir(id, version);
        let staging = target.with_file_name(format!(
            "{}-{}{}",
            id.to_lowercase(),
            version,
            STAGING_SUFFIX
        ));

        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(io_error)?;
        }
        fs::create_dir_all(&staging).map_err(io_error)?;

        let files = match unpack_payload(vsix, &staging) {
            Ok(files) => files,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        let manifest = PackageManifest::read_from(&staging);
        if !manifest.as_ref().is_some_and(PackageManifest::has_identity) {
            let _ = fs::remove_dir_all(&staging);
            return Err(OperationError::validation(format!(
                "{} has no valid extension/package.json",
                vsix.display()
            )));
        }

        if target.exists() {
            fs::remove_dir_all(&target).map_err(io_error)?;
        }
        fs::rename(&staging, &target).map_err(io_error)?;

        info!(id = %id, version = %version, dir = %target.display(), files, "installed directly");
        Ok(target)
    }
}

/// Extract every `extension/` entry below `dest`; returns the file count
fn unpack_payload(vsix: &Path, dest: &Path) -> Result<usize, OperationError> {
    let file = File::open(vsix).map_err(io_error)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| {
        OperationError::validation(format!("corrupt package {}: {}", vsix.display(), e))
    })?;

    let mut files = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| {
            OperationError::validation(format!("corrupt package {}: {}", vsix.display(), e))
        })?;

        let Some(name) = entry.enclosed_name() else {
            debug!(entry = %entry.name(), "skipping unsafe archive path");
            continue;
        };
        let Ok(relative) = name.strip_prefix(PAYLOAD_PREFIX) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let out_path = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(io_error)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let mut out = File::create(&out_path).map_err(io_error)?;
        io::copy(&mut entry, &mut out).map_err(io_error)?;
        files += 1;
    }

    Ok(files)
}

fn io_error(e: io::Error) -> OperationError {
    OperationError::classify_or(e.to_string(), ErrorKind::Install)
}
