//! Backup store for one editor
//!
//! Archives live flat in one directory as `<backup-id>.tar.gz` plus a
//! `<backup-id>.json` manifest. Only the newest `max_backups` archives per
//! extension id are kept.

use crate::archive::ArchiveBuilder;
use crate::compression::verify_checksum;
use crate::manifest::{
    manifest_path, BackupManifest, BackupStatistics, BackupSubject, ChecksumInfo,
    MANIFEST_EXTENSION,
};
use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Creates, lists, restores and prunes extension backups.
#[derive(Debug, Clone)]
pub struct ArchiveBackup {
    backup_dir: PathBuf,
    max_backups: usize,
    builder: ArchiveBuilder,
}

impl ArchiveBackup {
    pub fn new(backup_dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            max_backups: max_backups.max(1),
            builder: ArchiveBuilder::new(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Archive `install_path` and return the manifest of the new backup.
    pub fn backup(
        &self,
        install_path: &Path,
        subject: &BackupSubject<'_>,
    ) -> anyhow::Result<BackupManifest> {
        let backup_id = Self::new_backup_id(subject.extension_id, subject.extension_version);
        let archive = crate::manifest::archive_path(&self.backup_dir, &backup_id);

        let result = self
            .builder
            .create(install_path, &archive)
            .with_context(|| format!("Failed to back up {}", subject.extension_id))?;

        let statistics =
            BackupStatistics::new(result.file_count, result.total_size_bytes, result.size_bytes)
                .with_duration(result.duration_seconds);
        let manifest = BackupManifest::new(
            backup_id.clone(),
            subject,
            install_path,
            statistics,
            ChecksumInfo::sha256(result.checksum),
        );

        let sidecar = manifest_path(&self.backup_dir, &backup_id);
        std::fs::write(&sidecar, manifest.to_json()?)
            .with_context(|| format!("Failed to write {}", sidecar.display()))?;

        tracing::info!(
            id = %subject.extension_id,
            backup = %backup_id,
            size = %manifest.statistics.human_readable_size(),
            "backup created"
        );

        if let Err(e) = self.prune(subject.extension_id) {
            tracing::warn!(id = %subject.extension_id, error = %e, "failed to prune old backups");
        }

        Ok(manifest)
    }

    /// All readable manifests, newest first; `extension_id` filters case-insensitively.
    pub fn list(&self, extension_id: Option<&str>) -> anyhow::Result<Vec<BackupManifest>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut manifests = Vec::new();
        for entry in std::fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION) {
                continue;
            }

            let manifest = match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|text| BackupManifest::from_json(&text))
            {
                Ok(manifest) => manifest,
                Err(e) => {
                    tracing::debug!(
                        path = %path.display(),
                        error = %e,
                        "skipping unreadable manifest"
                    );
                    continue;
                }
            };

            if extension_id.map_or(true, |id| manifest.extension_id.eq_ignore_ascii_case(id)) {
                manifests.push(manifest);
            }
        }

        manifests.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.backup_id.cmp(&a.backup_id))
        });
        Ok(manifests)
    }

    /// Look up one backup by id.
    pub fn find(&self, backup_id: &str) -> anyhow::Result<BackupManifest> {
        let path = manifest_path(&self.backup_dir, backup_id);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Backup not found: {}", backup_id))?;
        BackupManifest::from_json(&text)
    }

    /// Restore a backup into `dest_dir`, replacing whatever is there.
    pub fn restore(&self, backup_id: &str, dest_dir: &Path) -> anyhow::Result<BackupManifest> {
        let manifest = self.find(backup_id)?;
        manifest.validate()?;

        let archive = manifest.archive_path(&self.backup_dir);
        verify_checksum(&archive, &manifest.checksum.value)?;

        if dest_dir.exists() {
            std::fs::remove_dir_all(dest_dir)
                .with_context(|| format!("Failed to clear {}", dest_dir.display()))?;
        }
        self.builder.extract(&archive, dest_dir)?;

        tracing::info!(
            id = %manifest.extension_id,
            backup = %backup_id,
            dest = %dest_dir.display(),
            "backup restored"
        );
        Ok(manifest)
    }

    /// Delete all but the newest `max_backups` archives of `extension_id`.
    pub fn prune(&self, extension_id: &str) -> anyhow::Result<usize> {
        let manifests = self.list(Some(extension_id))?;
        let mut removed = 0;

        for manifest in manifests.iter().skip(self.max_backups) {
            let archive = manifest.archive_path(&self.backup_dir);
            let sidecar = manifest_path(&self.backup_dir, &manifest.backup_id);
            for path in [archive, sidecar] {
                if path.exists() {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("Failed to remove {}", path.display()))?;
                }
            }
            removed += 1;
        }

        if removed > 0 {
            tracing::debug!(id = %extension_id, removed, "pruned old backups");
        }
        Ok(removed)
    }

    fn new_backup_id(extension_id: &str, version: &str) -> String {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}-{}-{}-{}",
            extension_id.to_lowercase(),
            version,
            stamp,
            &suffix[..8]
        )
    }
}
