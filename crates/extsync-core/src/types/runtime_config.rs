//! Engine configuration types
//!
//! These types define the configuration that controls a batch: how many
//! workers run, how versions are resolved, which registries are used, how
//! failures are retried and where backups go.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::extension_types::{EditorKind, RegistrySource};

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Editor whose extensions are managed
    #[serde(default)]
    pub editor: EditorKind,

    /// Bulk execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Version resolution settings
    #[serde(default)]
    pub resolution: ResolutionConfig,

    /// Registry endpoints and preference
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Retry chain settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Backup policy
    #[serde(default)]
    pub backup: BackupConfig,

    /// Network and HTTP configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Optional path overrides
    #[serde(default)]
    pub paths: PathOverrides,
}

/// Bulk execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutionConfig {
    /// Number of units in flight at once
    #[serde(default = "default_execution_concurrency")]
    pub concurrency: usize,

    /// Plan and report without side effects
    #[serde(default)]
    pub dry_run: bool,

    /// Never prompt; the user-intervention strategy is disabled
    #[serde(default)]
    pub unattended: bool,

    /// Allow degrading a failing install to fetch-only
    #[serde(default = "default_true")]
    pub download_only_fallback: bool,

    /// Initial per-attempt timeout in seconds
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_execution_concurrency(),
            dry_run: false,
            unattended: false,
            download_only_fallback: true,
            install_timeout_secs: default_install_timeout(),
        }
    }
}

impl ExecutionConfig {
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

fn default_execution_concurrency() -> usize {
    1
}
fn default_install_timeout() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

/// Version resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolutionConfig {
    /// Concurrent registry lookups
    #[serde(default = "default_resolution_concurrency")]
    pub concurrency: usize,

    /// Delay between consecutive lookups of one worker, in milliseconds
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Resolve prerelease versions when the registry offers them
    #[serde(default)]
    pub prefer_prerelease: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_resolution_concurrency(),
            request_delay_ms: default_request_delay(),
            prefer_prerelease: false,
        }
    }
}

impl ResolutionConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

fn default_resolution_concurrency() -> usize {
    5
}
fn default_request_delay() -> u64 {
    100
}

/// Registry endpoints and preference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourcesConfig {
    /// Registry tried first; defaults to the editor's own registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred: Option<RegistrySource>,

    /// Try the other registry when the preferred one fails
    #[serde(default = "default_true")]
    pub fallback: bool,

    /// Open VSX base URL
    #[serde(default = "default_open_vsx_url")]
    pub open_vsx_url: String,

    /// VS Marketplace base URL
    #[serde(default = "default_marketplace_url")]
    pub marketplace_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            preferred: None,
            fallback: true,
            open_vsx_url: default_open_vsx_url(),
            marketplace_url: default_marketplace_url(),
        }
    }
}

impl SourcesConfig {
    /// Preferred registry for `editor`
    pub fn preferred_for(&self, editor: EditorKind) -> RegistrySource {
        self.preferred.unwrap_or_else(|| editor.default_source())
    }
}

fn default_open_vsx_url() -> String {
    "https://open-vsx.org".to_string()
}
fn default_marketplace_url() -> String {
    "https://marketplace.visualstudio.com".to_string()
}

/// Retry chain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Upper bound on attempts per unit, across all strategies
    #[serde(default = "default_chain_max_attempts")]
    pub max_attempts: u32,

    /// Backoff used by the network-retry strategy
    #[serde(default = "default_network_policy")]
    pub network: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_chain_max_attempts(),
            network: default_network_policy(),
        }
    }
}

fn default_chain_max_attempts() -> u32 {
    5
}
fn default_network_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        strategy: RetryStrategy::ExponentialBackoff,
        backoff_multiplier: 2.0,
        initial_delay_ms: 1000,
        max_delay_ms: 30000,
        jitter: false,
    }
}

/// Retry policy for an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Add up to 25% random delay on top of the capped delay
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            jitter: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}

/// Backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// No delay
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    /// Linear backoff
    LinearBackoff,
}

/// Backup policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackupConfig {
    /// Back up each extension before replacing it
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Archives kept per extension id
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_backups: default_max_backups(),
        }
    }
}

fn default_max_backups() -> usize {
    3
}

/// Network and HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// HTTP timeout in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// User agent string for HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout() -> u64 {
    60
}
fn default_user_agent() -> String {
    format!(
        "extsync/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Optional overrides for resolved editor paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PathOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
}
