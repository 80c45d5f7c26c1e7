//! extsync backup store
//!
//! Snapshots a single extension directory before it is replaced so a bad
//! update can be rolled back. Each backup is a streaming tar+gzip archive
//! with a JSON manifest sidecar carrying a SHA256 checksum.
//!
//! # Examples
//!
//! ```no_run
//! use extsync_backup::{ArchiveBackup, BackupSubject};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = ArchiveBackup::new("/home/dev/.extsync/backups/vscode", 3);
//!     let manifest = store.backup(
//!         Path::new("/home/dev/.vscode/extensions/ms-python.python-2024.1.0"),
//!         &BackupSubject {
//!             extension_id: "ms-python.python",
//!             extension_version: "2024.1.0",
//!             editor: "vscode",
//!             note: Some("before update"),
//!         },
//!     )?;
//!
//!     println!("Backup created: {}", manifest.backup_id);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod compression;
pub mod manifest;
pub mod store;

pub use archive::{ArchiveBuilder, ArchiveResult};
pub use compression::{calculate_checksum, verify_checksum, DEFAULT_COMPRESSION_LEVEL};
pub use manifest::{
    BackupManifest, BackupStatistics, BackupSubject, ChecksumInfo, MANIFEST_VERSION,
};
pub use store::ArchiveBackup;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
