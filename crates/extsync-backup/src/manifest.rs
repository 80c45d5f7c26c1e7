//! Backup manifest format and metadata.
//!
//! Each archive `<id>.tar.gz` has a sidecar `<id>.json` describing which
//! extension it holds, where it came from and how to verify it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::compression::CHECKSUM_ALGORITHM;

/// Version of the backup manifest format.
pub const MANIFEST_VERSION: &str = "1.0.0";

/// Archive file extension.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

/// Sidecar manifest file extension.
pub const MANIFEST_EXTENSION: &str = "json";

/// Sidecar manifest stored next to every backup archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Manifest format version
    pub version: String,

    /// Backup id, also the archive file stem
    pub backup_id: String,

    /// `publisher.name` of the backed-up extension
    pub extension_id: String,

    /// Version that was installed when the backup was taken
    pub extension_version: String,

    /// Editor the extension belonged to
    pub editor: String,

    /// When the backup was created
    pub created_at: DateTime<Utc>,

    /// What created this backup (e.g., "extsync v0.4.0")
    pub created_by: String,

    /// Directory that was archived
    pub source_dir: PathBuf,

    /// Why the backup was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Compression algorithm used
    pub compression: String,

    /// Checksum information
    pub checksum: ChecksumInfo,

    /// Backup statistics
    pub statistics: BackupStatistics,
}

/// Checksum information for integrity verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumInfo {
    /// Hash algorithm (sha256)
    pub algorithm: String,

    /// Hex-encoded checksum value
    pub value: String,
}

impl ChecksumInfo {
    pub fn sha256(value: impl Into<String>) -> Self {
        Self {
            algorithm: CHECKSUM_ALGORITHM.to_string(),
            value: value.into(),
        }
    }
}

/// Statistics about the backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupStatistics {
    /// Number of files included in backup
    pub files_included: usize,

    /// Total uncompressed size in bytes
    pub total_size_bytes: u64,

    /// Compressed archive size in bytes
    pub compressed_size_bytes: u64,

    /// Duration of backup operation in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

/// What is being backed up, as reported by the caller.
#[derive(Debug, Clone)]
pub struct BackupSubject<'a> {
    pub extension_id: &'a str,
    pub extension_version: &'a str,
    pub editor: &'a str,
    pub note: Option<&'a str>,
}

impl BackupManifest {
    /// Creates a new backup manifest.
    pub fn new(
        backup_id: impl Into<String>,
        subject: &BackupSubject<'_>,
        source_dir: &Path,
        statistics: BackupStatistics,
        checksum: ChecksumInfo,
    ) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            backup_id: backup_id.into(),
            extension_id: subject.extension_id.to_string(),
            extension_version: subject.extension_version.to_string(),
            editor: subject.editor.to_string(),
            created_at: Utc::now(),
            created_by: format!("extsync v{}", env!("CARGO_PKG_VERSION")),
            source_dir: source_dir.to_path_buf(),
            note: subject.note.map(str::to_string),
            compression: "gzip".to_string(),
            checksum,
            statistics,
        }
    }

    /// Serializes the manifest to JSON.
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize manifest: {}", e))
    }

    /// Deserializes a manifest from JSON.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("Failed to deserialize manifest: {}", e))
    }

    /// Validates that the manifest is compatible with the current version.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.version != MANIFEST_VERSION {
            return Err(anyhow::anyhow!(
                "Incompatible manifest version: {} (expected {})",
                self.version,
                MANIFEST_VERSION
            ));
        }

        if self.checksum.algorithm != CHECKSUM_ALGORITHM {
            return Err(anyhow::anyhow!(
                "Unsupported checksum algorithm: {}",
                self.checksum.algorithm
            ));
        }

        if self.compression != "gzip" {
            return Err(anyhow::anyhow!(
                "Unsupported compression: {}",
                self.compression
            ));
        }

        Ok(())
    }

    /// Archive path for this manifest inside `backup_dir`
    pub fn archive_path(&self, backup_dir: &Path) -> PathBuf {
        archive_path(backup_dir, &self.backup_id)
    }
}

/// `<backup_dir>/<id>.tar.gz`
pub fn archive_path(backup_dir: &Path, backup_id: &str) -> PathBuf {
    backup_dir.join(format!("{}.{}", backup_id, ARCHIVE_EXTENSION))
}

/// `<backup_dir>/<id>.json`
pub fn manifest_path(backup_dir: &Path, backup_id: &str) -> PathBuf {
    backup_dir.join(format!("{}.{}", backup_id, MANIFEST_EXTENSION))
}

impl BackupStatistics {
    /// Creates new backup statistics.
    pub fn new(files_included: usize, total_size_bytes: u64, compressed_size_bytes: u64) -> Self {
        Self {
            files_included,
            total_size_bytes,
            compressed_size_bytes,
            duration_seconds: None,
        }
    }

    /// Sets the backup duration.
    pub fn with_duration(mut self, duration_seconds: f64) -> Self {
        self.duration_seconds = Some(duration_seconds);
        self
    }

    /// Returns a human-readable size string.
    pub fn human_readable_size(&self) -> String {
        human_bytes(self.compressed_size_bytes)
    }
}

/// Formats bytes as a human-readable string.
fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> BackupManifest {
        let subject = BackupSubject {
            extension_id: "ms-python.python",
            extension_version: "2024.1.0",
            editor: "vscode",
            note: Some("before update to 2024.2.0"),
        };
        BackupManifest::new(
            "ms-python.python-2024.1.0-abc",
            &subject,
            Path::new("/home/dev/.vscode/extensions/ms-python.python-2024.1.0"),
            BackupStatistics::new(12, 4096, 1024),
            ChecksumInfo::sha256("abc123def456"),
        )
    }

    #[test]
    fn test_manifest_creation() {
        let manifest = sample_manifest();
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert_eq!(manifest.compression, "gzip");
        assert_eq!(manifest.extension_id, "ms-python.python");
        assert!(manifest.created_by.starts_with("extsync v"));
    }

    #[test]
    fn test_manifest_serialization() {
        let manifest = sample_manifest();
        let json = manifest.to_json().unwrap();
        assert!(json.contains("backup_id"));
        assert!(json.contains("before update to 2024.2.0"));

        let deserialized = BackupManifest::from_json(&json).unwrap();
        assert_eq!(deserialized, manifest);
    }

    #[test]
    fn test_manifest_validation() {
        let mut manifest = sample_manifest();
        assert!(manifest.validate().is_ok());

        manifest.version = "2.0.0".to_string();
        assert!(manifest.validate().is_err());

        manifest.version = MANIFEST_VERSION.to_string();
        manifest.checksum.algorithm = "md5".to_string();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_paths() {
        let dir = Path::new("/b");
        assert_eq!(archive_path(dir, "x"), PathBuf::from("/b/x.tar.gz"));
        assert_eq!(manifest_path(dir, "x"), PathBuf::from("/b/x.json"));
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1024), "1.00 KB");
        assert_eq!(human_bytes(5_242_880), "5.00 MB");
    }
}
