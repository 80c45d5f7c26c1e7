//! Archive creation and extraction for backups.
//!
//! Archives are gzip-compressed tarballs whose entries are relative to the
//! archived directory, so a backup of `<ext>/pub.a-1.0.0` extracts back into
//! a directory of any name.

use crate::compression::{calculate_checksum, DEFAULT_COMPRESSION_LEVEL};
use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

/// Result of an archive operation.
#[derive(Debug, Clone)]
pub struct ArchiveResult {
    /// Path to the created archive
    pub archive_path: PathBuf,

    /// Size of the archive in bytes
    pub size_bytes: u64,

    /// Sum of the archived file sizes in bytes
    pub total_size_bytes: u64,

    /// Number of files included
    pub file_count: usize,

    /// SHA256 of the archive
    pub checksum: String,

    /// Duration of the operation in seconds
    pub duration_seconds: f64,
}

/// Archive builder for creating and extracting backups.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    compression_level: u32,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Sets the compression level (clamped to 1-9).
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.clamp(1, 9);
        self
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// Archives every file below `source_dir` into `output_path`.
    pub fn create(&self, source_dir: &Path, output_path: &Path) -> anyhow::Result<ArchiveResult> {
        let start_time = Instant::now();

        if !source_dir.is_dir() {
            anyhow::bail!("Backup source is not a directory: {}", source_dir.display());
        }

        let files = Self::scan_directory(source_dir)?;

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let output = File::create(output_path)
            .with_context(|| format!("Failed to create archive {}", output_path.display()))?;
        let encoder = GzEncoder::new(
            BufWriter::new(output),
            Compression::new(self.compression_level),
        );
        let mut tar = TarBuilder::new(encoder);

        let mut total_size_bytes = 0u64;
        for rel_path in &files {
            let full_path = source_dir.join(rel_path);
            total_size_bytes += std::fs::metadata(&full_path)?.len();
            tar.append_path_with_name(&full_path, rel_path)
                .with_context(|| format!("Failed to add {} to archive", full_path.display()))?;
        }

        let encoder = tar.into_inner().context("Failed to finish tar stream")?;
        let mut writer = encoder.finish().context("Failed to finish gzip stream")?;
        writer.flush()?;
        drop(writer);

        let size_bytes = std::fs::metadata(output_path)?.len();
        let checksum = calculate_checksum(output_path)?;

        tracing::debug!(
            source = %source_dir.display(),
            archive = %output_path.display(),
            files = files.len(),
            size_bytes,
            "archive created"
        );

        Ok(ArchiveResult {
            archive_path: output_path.to_path_buf(),
            size_bytes,
            total_size_bytes,
            file_count: files.len(),
            checksum,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        })
    }

    /// Extracts `archive_path` into `dest_dir`, creating it if needed.
    pub fn extract(&self, archive_path: &Path, dest_dir: &Path) -> anyhow::Result<()> {
        let file = File::open(archive_path)
            .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
        std::fs::create_dir_all(dest_dir)?;

        let mut archive = tar::Archive::new(GzDecoder::new(file));
        archive
            .unpack(dest_dir)
            .with_context(|| format!("Failed to extract {}", archive_path.display()))?;
        Ok(())
    }

    /// Relative paths of all regular files below `source_dir`, sorted.
    fn scan_directory(source_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(source_dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| anyhow::anyhow!("Failed to walk directory: {}", e))?;

            if entry.file_type().is_file() {
                let rel_path = entry
                    .path()
                    .strip_prefix(source_dir)
                    .map_err(|e| anyhow::anyhow!("Failed to compute relative path: {}", e))?;
                files.push(rel_path.to_path_buf());
            }
        }

        Ok(files)
    }
}
