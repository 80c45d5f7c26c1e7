//! Hierarchical configuration loader with precedence
//!
//! Loads configuration from multiple sources with the following precedence (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Global config (~/.extsync/config.yaml)
//! 3. Environment variables (EXTSYNC_* prefix)
//! 4. CLI flags (handled by caller)
//!
//! Layers are merged key by key, so a file that sets only
//! `execution.concurrency` keeps every other embedded default.

use crate::error::{Error, Result};
use crate::types::{EditorKind, EngineConfig, RegistrySource};
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde_yaml_ng::Value;
use std::env;
use std::fs;

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

const DEFAULTS_FILE: &str = "engine-defaults.yaml";
const CONFIG_FILE: &str = "config.yaml";

/// Configuration hierarchy loader
pub struct HierarchicalConfigLoader {
    /// Base directory for configuration files
    config_dir: Utf8PathBuf,
}

impl HierarchicalConfigLoader {
    /// Create a loader rooted at ~/.extsync
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self { config_dir })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    /// Get the standard config directory (~/.extsync)
    fn get_config_dir() -> Result<Utf8PathBuf> {
        let home = crate::paths::get_home_dir()?;
        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|p| {
                Error::invalid_config(format!("Non UTF-8 home directory: {}", p.display()))
            })?;
        Ok(home.join(".extsync"))
    }

    /// Load engine configuration with hierarchical precedence
    pub fn load(&self) -> Result<EngineConfig> {
        let path = self.config_dir.join(CONFIG_FILE);
        self.load_from(path.exists().then_some(path.as_path()))
    }

    /// Load engine configuration, using `file` instead of the global config
    ///
    /// An explicitly named file must exist.
    pub fn load_with_file(&self, file: &Utf8Path) -> Result<EngineConfig> {
        if !file.exists() {
            return Err(Error::config_not_found(file.as_str()));
        }
        self.load_from(Some(file))
    }

    fn load_from(&self, file: Option<&Utf8Path>) -> Result<EngineConfig> {
        let mut merged = Self::load_embedded_value(DEFAULTS_FILE)?;

        if let Some(path) = file {
            tracing::debug!(path = %path, "loading config file");
            let overlay = Self::load_yaml_value(path)?;
            Self::merge_values(&mut merged, overlay);
        }

        let config: EngineConfig = serde_yaml_ng::from_value(merged)
            .map_err(|e| Error::invalid_config(format!("Failed to parse configuration: {}", e)))?;

        let config = Self::apply_env_overrides(config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load an embedded configuration file
    fn load_embedded_value(filename: &str) -> Result<Value> {
        let embedded_file = EmbeddedConfigs::get(filename).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", filename))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", filename))
        })?;

        serde_yaml_ng::from_str(content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse embedded config {}: {}",
                filename, e
            ))
        })
    }

    /// Load a YAML file as an untyped value
    fn load_yaml_value(path: &Utf8Path) -> Result<Value> {
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    /// Deep-merge `overlay` into `base`; mappings merge, everything else replaces
    fn merge_values(base: &mut Value, overlay: Value) {
        match (base, overlay) {
            (_, Value::Null) => {}
            (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
                for (key, value) in overlay_map {
                    match base_map.get_mut(&key) {
                        Some(existing) => Self::merge_values(existing, value),
                        None => {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
            (slot, value) => *slot = value,
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: EngineConfig) -> Result<EngineConfig> {
        if let Ok(val) = env::var("EXTSYNC_EDITOR") {
            config.editor = val.parse::<EditorKind>()?;
        }

        if let Ok(val) = env::var("EXTSYNC_CONCURRENCY") {
            config.execution.concurrency = val.parse().map_err(|_| {
                Error::invalid_config("EXTSYNC_CONCURRENCY must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("EXTSYNC_INSTALL_TIMEOUT_SECS") {
            config.execution.install_timeout_secs = val.parse().map_err(|_| {
                Error::invalid_config("EXTSYNC_INSTALL_TIMEOUT_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("EXTSYNC_UNATTENDED") {
            config.execution.unattended = parse_flag(&val);
        }

        if let Ok(val) = env::var("EXTSYNC_SOURCE") {
            config.sources.preferred = Some(val.parse::<RegistrySource>()?);
        }

        if let Ok(val) = env::var("EXTSYNC_OPEN_VSX_URL") {
            config.sources.open_vsx_url = val;
        }

        if let Ok(val) = env::var("EXTSYNC_MARKETPLACE_URL") {
            config.sources.marketplace_url = val;
        }

        if let Ok(val) = env::var("EXTSYNC_HTTP_TIMEOUT_SECS") {
            config.network.http_timeout_secs = val.parse().map_err(|_| {
                Error::invalid_config("EXTSYNC_HTTP_TIMEOUT_SECS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("EXTSYNC_MAX_BACKUPS") {
            config.backup.max_backups = val
                .parse()
                .map_err(|_| Error::invalid_config("EXTSYNC_MAX_BACKUPS must be a valid number"))?;
        }

        if let Ok(val) = env::var("EXTSYNC_NO_BACKUP") {
            if parse_flag(&val) {
                config.backup.enabled = false;
            }
        }

        if let Ok(val) = env::var("EXTSYNC_EXTENSIONS_DIR") {
            config.paths.extensions_dir = Some(val.into());
        }

        if let Ok(val) = env::var("EXTSYNC_EDITOR_BINARY") {
            config.paths.binary = Some(val.into());
        }

        Ok(config)
    }

    fn validate(config: &EngineConfig) -> Result<()> {
        if config.retry.max_attempts == 0 {
            return Err(Error::invalid_config("retry.max-attempts must be at least 1"));
        }
        if config.execution.install_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "execution.install-timeout-secs must be at least 1",
            ));
        }
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

fn parse_flag(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn create_temp_loader() -> (HierarchicalConfigLoader, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_dir =
            Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).expect("Invalid UTF-8 path");
        let loader = HierarchicalConfigLoader::with_dir(config_dir);
        (loader, temp_dir)
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        let (loader, _temp) = create_temp_loader();
        let config = loader.load().unwrap();
        assert_eq!(config.editor, EditorKind::Vscode);
        assert_eq!(config.execution.concurrency, 1);
        assert_eq!(config.resolution.concurrency, 5);
        assert_eq!(config.retry.network.initial_delay_ms, 1000);
        assert!(config.network.user_agent.starts_with("extsync/"));
    }

    #[test]
    #[serial]
    fn test_file_overlays_single_keys() {
        let (loader, _temp) = create_temp_loader();
        let content = r#"
editor: windsurf
execution:
  concurrency: 3
retry:
  network:
    initial-delay-ms: 5
"#;
        fs::write(loader.config_dir().join(CONFIG_FILE), content).unwrap();

        let config = loader.load().unwrap();
        assert_eq!(config.editor, EditorKind::Windsurf);
        assert_eq!(config.execution.concurrency, 3);
        assert_eq!(config.execution.install_timeout_secs, 120);
        assert_eq!(config.retry.network.initial_delay_ms, 5);
        assert_eq!(config.retry.network.max_delay_ms, 30000);
    }

    #[test]
    #[serial]
    fn test_empty_file_is_ignored() {
        let (loader, _temp) = create_temp_loader();
        fs::write(loader.config_dir().join(CONFIG_FILE), "\n").unwrap();
        let config = loader.load().unwrap();
        assert_eq!(config.backup.max_backups, 3);
    }

    #[test]
    #[serial]
    fn test_explicit_file_must_exist() {
        let (loader, _temp) = create_temp_loader();
        let missing = loader.config_dir().join("nope.yaml");
        assert!(matches!(
            loader.load_with_file(&missing),
            Err(Error::ConfigNotFound { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let (loader, _temp) = create_temp_loader();

        env::set_var("EXTSYNC_EDITOR", "cursor");
        env::set_var("EXTSYNC_CONCURRENCY", "8");
        env::set_var("EXTSYNC_SOURCE", "open-vsx");
        env::set_var("EXTSYNC_NO_BACKUP", "1");

        let config = loader.load().unwrap();
        assert_eq!(config.editor, EditorKind::Cursor);
        assert_eq!(config.execution.concurrency, 8);
        assert_eq!(config.sources.preferred, Some(RegistrySource::OpenVsx));
        assert!(!config.backup.enabled);

        env::remove_var("EXTSYNC_EDITOR");
        env::remove_var("EXTSYNC_CONCURRENCY");
        env::remove_var("EXTSYNC_SOURCE");
        env::remove_var("EXTSYNC_NO_BACKUP");
    }

    #[test]
    #[serial]
    fn test_invalid_env_value() {
        let (loader, _temp) = create_temp_loader();
        env::set_var("EXTSYNC_CONCURRENCY", "many");
        let result = loader.load();
        env::remove_var("EXTSYNC_CONCURRENCY");
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_merge_values() {
        let mut base: Value = serde_yaml_ng::from_str("a: 1\nb:\n  c: 2\n  d: 3\n").unwrap();
        let overlay: Value = serde_yaml_ng::from_str("b:\n  d: 4\ne: 5\n").unwrap();
        HierarchicalConfigLoader::merge_values(&mut base, overlay);

        let expected: Value = serde_yaml_ng::from_str("a: 1\nb:\n  c: 2\n  d: 4\ne: 5\n").unwrap();
        assert_eq!(base, expected);
    }
}
