//! Backups command: list stored extension backups

use anyhow::Result;
use extsync_backup::BackupManifest;
use extsync_extensions::backup_store;
use tabled::{settings::Style, Table, Tabled};

use super::Session;
use crate::cli::BackupsArgs;
use crate::output;

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Backup ID")]
    id: String,
    extension: String,
    version: String,
    created: String,
    size: String,
    note: String,
}

impl From<&BackupManifest> for BackupRow {
    fn from(m: &BackupManifest) -> Self {
        Self {
            id: m.backup_id.clone(),
            extension: m.extension_id.clone(),
            version: m.extension_version.clone(),
            created: m.created_at.format("%Y-%m-%d %H:%M").to_string(),
            size: m.statistics.human_readable_size(),
            note: m.note.clone().unwrap_or_default(),
        }
    }
}

pub fn run(session: Session, args: BackupsArgs) -> Result<()> {
    let store = backup_store(&session.config, &session.paths);
    let id = args.id.as_deref().map(str::to_lowercase);
    let backups = store.list(id.as_deref())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&backups)?);
        return Ok(());
    }

    if backups.is_empty() {
        output::info(&format!(
            "No backups in {}",
            store.backup_dir().display()
        ));
        return Ok(());
    }

    let rows: Vec<BackupRow> = backups.iter().map(BackupRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    Ok(())
}
