//! Compression and checksum utilities for backup operations.

use anyhow::Context;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Default compression level (6 = balanced speed/ratio).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Checksum algorithm recorded in manifests.
pub const CHECKSUM_ALGORITHM: &str = "sha256";

/// Calculates SHA256 checksum of a file.
pub fn calculate_checksum(path: &Path) -> anyhow::Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open file for checksum: {}", path.display()))?;

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).context("Failed to calculate checksum")?;

    let hash = hasher.finalize();
    Ok(format!("{:x}", hash))
}

/// Verifies that a file matches an expected SHA256 checksum.
pub fn verify_checksum(path: &Path, expected: &str) -> anyhow::Result<()> {
    let actual = calculate_checksum(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        anyhow::bail!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        );
    }
    Ok(())
}
