//! Backup adapter over the archive store

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use extsync_backup::{ArchiveBackup, BackupSubject};
use extsync_core::types::{BackupRef, EditorKind};

use crate::collaborators::BackupService;

/// [`BackupService`] writing tar.gz archives through [`ArchiveBackup`]
#[derive(Debug, Clone)]
pub struct ArchiveBackupService {
    store: ArchiveBackup,
}

impl ArchiveBackupService {
    pub fn new(store: ArchiveBackup) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ArchiveBackup {
        &self.store
    }
}

#[async_trait]
impl BackupService for ArchiveBackupService {
    async fn backup(
        &self,
        install_path: &Path,
        id: &str,
        version: &str,
        editor: EditorKind,
        note: Option<&str>,
    ) -> anyhow::Result<BackupRef> {
        let store = self.store.clone();
        let install_path = install_path.to_path_buf();
        let id = id.to_string();
        let version = version.to_string();
        let editor = editor.to_string();
        let note = note.map(str::to_string);

        // Archiving and hashing are blocking work
        let manifest = tokio::task::spawn_blocking(move || {
            store.backup(
                &install_path,
                &BackupSubject {
                    extension_id: &id,
                    extension_version: &version,
                    editor: &editor,
                    note: note.as_deref(),
                },
            )
        })
        .await
        .context("Backup task panicked")??;

        Ok(BackupRef(manifest.backup_id))
    }
}
