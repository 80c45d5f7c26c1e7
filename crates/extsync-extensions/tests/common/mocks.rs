//! Mock collaborators for engine tests
//!
//! Each mock records how it was called and answers from pre-configured
//! responses, without network access or child processes.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use extsync_core::retry::{InterventionDecision, InterventionHandler, RetryContext};
use extsync_core::types::{BackupRef, EditorKind, InstalledItem, RegistrySource};
use extsync_core::{EditorPaths, OperationError};
use extsync_extensions::{
    BackupService, CliOutput, DirectInstaller, EditorCli, InstallOptions, InstalledSource,
    RegistryClient,
};

use super::fixtures::{read_vsix_identity, write_vsix};

/// Registry answering from in-memory tables
///
/// Fetches write a real VSIX into the download directory unless a scripted
/// failure is pending for the id.
pub struct MockRegistry {
    download_dir: PathBuf,
    latest: Mutex<HashMap<String, String>>,
    latest_on: Mutex<HashMap<(String, RegistrySource), Result<String, OperationError>>>,
    fetch_failures: Mutex<HashMap<String, VecDeque<OperationError>>>,
    resolve_calls: Mutex<Vec<(String, RegistrySource)>>,
    fetch_calls: Mutex<Vec<(String, String, RegistrySource)>>,
}

impl MockRegistry {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            latest: Mutex::new(HashMap::new()),
            latest_on: Mutex::new(HashMap::new()),
            fetch_failures: Mutex::new(HashMap::new()),
            resolve_calls: Mutex::new(Vec::new()),
            fetch_calls: Mutex::new(Vec::new()),
        }
    }

    /// Latest version of `id` on every source
    pub fn with_latest(self, id: &str, version: &str) -> Self {
        self.latest
            .lock()
            .unwrap()
            .insert(id.to_lowercase(), version.to_string());
        self
    }

    /// Answer for `id` on one source only
    pub fn with_latest_on(
        self,
        id: &str,
        source: RegistrySource,
        answer: Result<&str, OperationError>,
    ) -> Self {
        self.latest_on.lock().unwrap().insert(
            (id.to_lowercase(), source),
            answer.map(str::to_string),
        );
        self
    }

    /// The next `times` fetches of `id` fail with `error`
    pub fn fail_fetch(self, id: &str, times: usize, error: OperationError) -> Self {
        self.fetch_failures
            .lock()
            .unwrap()
            .entry(id.to_lowercase())
            .or_default()
            .extend(std::iter::repeat(error).take(times));
        self
    }

    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetch_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(fetched, _, _)| fetched.eq_ignore_ascii_case(id))
            .count()
    }

    pub fn fetch_sources(&self, id: &str) -> Vec<RegistrySource> {
        self.fetch_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(fetched, _, _)| fetched.eq_ignore_ascii_case(id))
            .map(|(_, _, source)| *source)
            .collect()
    }

    pub fn resolve_calls(&self) -> Vec<(String, RegistrySource)> {
        self.resolve_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn resolve_latest_version(
        &self,
        id: &str,
        _prefer_prerelease: bool,
        source: RegistrySource,
    ) -> Result<String, OperationError> {
        self.resolve_calls
            .lock()
            .unwrap()
            .push((id.to_string(), source));

        let key = id.to_lowercase();
        if let Some(answer) = self.latest_on.lock().unwrap().get(&(key.clone(), source)) {
            return answer.clone();
        }
        match self.latest.lock().unwrap().get(&key) {
            Some(version) => Ok(version.clone()),
            None => Err(OperationError::classify(format!("404 not found: {}", id))),
        }
    }

    async fn fetch(
        &self,
        id: &str,
        version: &str,
        source: RegistrySource,
    ) -> Result<PathBuf, OperationError> {
        self.fetch_calls
            .lock()
            .unwrap()
            .push((id.to_string(), version.to_string(), source));

        let scripted = self
            .fetch_failures
            .lock()
            .unwrap()
            .get_mut(&id.to_lowercase())
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }

        let path = self
            .download_dir
            .join(format!("{}-{}.vsix", id.to_lowercase(), version));
        write_vsix(&path, id, version);
        Ok(path)
    }
}

/// One recorded editor CLI call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliCall {
    pub operation: &'static str,
    pub target: String,
    pub force_reinstall: bool,
    pub timeout: Option<Duration>,
}

/// Editor CLI answering from scripted outputs
///
/// With an extensions directory set, a successful install unpacks the
/// package there the way the real editor would.
pub struct MockEditorCli {
    install_results: Mutex<VecDeque<CliOutput>>,
    install_default: Mutex<CliOutput>,
    uninstall_results: Mutex<HashMap<String, CliOutput>>,
    calls: Mutex<Vec<CliCall>>,
    extensions_dir: Option<PathBuf>,
    install_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for MockEditorCli {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEditorCli {
    pub fn new() -> Self {
        Self {
            install_results: Mutex::new(VecDeque::new()),
            install_default: Mutex::new(CliOutput::ok("installed")),
            uninstall_results: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            extensions_dir: None,
            install_delay: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Unpack successful installs into `dir`
    pub fn installing_into(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extensions_dir = Some(dir.into());
        self
    }

    pub fn with_install_delay(mut self, delay: Duration) -> Self {
        self.install_delay = Some(delay);
        self
    }

    /// Answer the next install with `output`
    pub fn push_install(self, output: CliOutput) -> Self {
        self.install_results.lock().unwrap().push_back(output);
        self
    }

    /// Answer every unscripted install with `output`
    pub fn install_always(self, output: CliOutput) -> Self {
        *self.install_default.lock().unwrap() = output;
        self
    }

    pub fn with_uninstall(self, id: &str, output: CliOutput) -> Self {
        self.uninstall_results
            .lock()
            .unwrap()
            .insert(id.to_lowercase(), output);
        self
    }

    pub fn calls(&self) -> Vec<CliCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn install_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation == "install")
            .count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

/// Failed CLI output carrying `stderr`, like a non-zero editor exit
pub fn cli_failure(stderr: &str) -> CliOutput {
    CliOutput {
        success: false,
        error: None,
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: Some(1),
    }
}

#[async_trait]
impl EditorCli for MockEditorCli {
    async fn install(&self, _binary: &Path, file: &Path, options: InstallOptions) -> CliOutput {
        self.calls.lock().unwrap().push(CliCall {
            operation: "install",
            target: file.display().to_string(),
            force_reinstall: options.force_reinstall,
            timeout: Some(options.timeout),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.install_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self.install_results.lock().unwrap().pop_front();
        let output = scripted.unwrap_or_else(|| self.install_default.lock().unwrap().clone());

        if output.success {
            if let (Some(dir), Some((id, version))) =
                (&self.extensions_dir, read_vsix_identity(file))
            {
                DirectInstaller::new(dir)
                    .install_blocking(file, &id, &version)
                    .unwrap();
            }
        }
        output
    }

    async fn uninstall(&self, _binary: &Path, id: &str) -> CliOutput {
        self.calls.lock().unwrap().push(CliCall {
            operation: "uninstall",
            target: id.to_string(),
            force_reinstall: false,
            timeout: None,
        });
        self.uninstall_results
            .lock()
            .unwrap()
            .get(&id.to_lowercase())
            .cloned()
            .unwrap_or_else(|| CliOutput::ok(format!("Extension '{}' was uninstalled", id)))
    }
}

/// Backup service that records calls and hands out predictable refs
#[derive(Default)]
pub struct MockBackup {
    calls: Mutex<Vec<(String, String, Option<String>)>>,
    failing: bool,
}

impl MockBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackupService for MockBackup {
    async fn backup(
        &self,
        install_path: &Path,
        id: &str,
        version: &str,
        _editor: EditorKind,
        note: Option<&str>,
    ) -> anyhow::Result<BackupRef> {
        self.calls.lock().unwrap().push((
            id.to_string(),
            version.to_string(),
            note.map(str::to_string),
        ));
        if self.failing {
            anyhow::bail!("disk full while archiving {}", install_path.display());
        }
        Ok(BackupRef(format!("{}-{}-backup", id, version)))
    }
}

/// Installed list fixed at construction
pub struct StaticInstalled(pub Vec<InstalledItem>);

#[async_trait]
impl InstalledSource for StaticInstalled {
    async fn list_installed(&self, _paths: &EditorPaths) -> anyhow::Result<Vec<InstalledItem>> {
        Ok(self.0.clone())
    }
}

/// Intervention handler that always answers the same way
pub struct FixedIntervention {
    decision: InterventionDecision,
    asked: AtomicUsize,
}

impl FixedIntervention {
    pub fn new(decision: InterventionDecision) -> Self {
        Self {
            decision,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InterventionHandler for FixedIntervention {
    async fn decide(
        &self,
        _label: &str,
        _error: &OperationError,
        _ctx: &RetryContext,
    ) -> InterventionDecision {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}
