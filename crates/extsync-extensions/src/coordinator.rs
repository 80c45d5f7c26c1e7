//! Bulk execution of planned changes
//!
//! Every [`ChangePlan`] becomes one unit on the [`TaskExecutor`]:
//! back up the current install (best-effort), then fetch and apply the
//! target version inside the [`RetryChain`]. Strategies steer later attempts
//! through the context metadata: `install_path = Direct` unpacks the package
//! without the editor CLI, `skip_install` stops after the download.
//!
//! Units never touch `extensions.json` or `.obsolete`; the reconciler does
//! that once the pool has drained.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use extsync_core::retry::{InstallPath, RetryChain, RetryContext, RetryError, RetryMetadata};
use extsync_core::types::{
    is_valid_extension_id, BackupRef, ChangePlan, EngineConfig, RegistrySource, Summary,
    UnitOutcome, UnitStatus,
};
use extsync_core::{EditorPaths, OperationError};
use tracing::{debug, info, warn};

use crate::collaborators::{BackupService, EditorCli, InstallOptions, RegistryClient};
use crate::direct_install::DirectInstaller;
use crate::error::{EngineError, Result};
use crate::pool::{ExecutionReport, Flow, TaskExecutor};
use crate::reconciler::StateReconciler;

/// Settings for one batch
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Units in flight at once
    pub concurrency: usize,

    pub dry_run: bool,

    /// Never prompt; user intervention is disabled
    pub unattended: bool,

    /// Allow degrading a failing install to download-only
    pub download_only_fallback: bool,

    /// Initial per-attempt deadline
    pub install_timeout: Duration,

    pub max_attempts: u32,

    pub backup_enabled: bool,

    pub preferred_source: RegistrySource,

    pub source_fallback: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            dry_run: false,
            unattended: false,
            download_only_fallback: true,
            install_timeout: Duration::from_secs(120),
            max_attempts: 5,
            backup_enabled: true,
            preferred_source: RegistrySource::OpenVsx,
            source_fallback: true,
        }
    }
}

impl CoordinatorOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            concurrency: config.execution.concurrency,
            dry_run: config.execution.dry_run,
            unattended: config.execution.unattended,
            download_only_fallback: config.execution.download_only_fallback,
            install_timeout: config.execution.install_timeout(),
            max_attempts: config.retry.max_attempts,
            backup_enabled: config.backup.enabled,
            preferred_source: config.sources.preferred_for(config.editor),
            source_fallback: config.sources.fallback,
        }
    }
}

/// How a successful unit ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum Applied {
    Installed,
    /// Fetched only; the package is left at this path
    Downloaded(PathBuf),
}

/// Runs planned changes concurrently and collects one outcome per plan
pub struct BulkExecutionCoordinator {
    paths: EditorPaths,
    registry: Arc<dyn RegistryClient>,
    cli: Arc<dyn EditorCli>,
    backup: Option<Arc<dyn BackupService>>,
    chain: RetryChain,
    direct: DirectInstaller,
    options: CoordinatorOptions,
}

impl BulkExecutionCoordinator {
    pub fn new(
        paths: EditorPaths,
        registry: Arc<dyn RegistryClient>,
        cli: Arc<dyn EditorCli>,
        chain: RetryChain,
    ) -> Self {
        let direct = DirectInstaller::new(&paths.extensions_dir);
        Self {
            paths,
            registry,
            cli,
            backup: None,
            chain,
            direct,
            options: CoordinatorOptions::default(),
        }
    }

    pub fn with_backup(mut self, backup: Arc<dyn BackupService>) -> Self {
        self.backup = Some(backup);
        self
    }

    pub fn with_options(mut self, options: CoordinatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Apply every plan
    ///
    /// Per-item failures end up in the summary. If the user aborts, units
    /// already running finish, the rest are recorded as skipped, and the
    /// partial summary comes back inside [`EngineError::Aborted`].
    pub async fn execute(&self, plans: &[ChangePlan]) -> Result<Summary> {
        let started = Instant::now();
        info!(
            items = plans.len(),
            concurrency = self.options.concurrency,
            dry_run = self.options.dry_run,
            "executing plan"
        );

        let report = TaskExecutor::new(self.options.concurrency)
            .run(plans, |_, plan| self.update_unit(plan))
            .await;

        let (summary, aborted) =
            finish_summary(report, plans, started, self.options.dry_run, |plan| {
                UnitOutcome::new(&plan.id, UnitStatus::Skipped)
                    .with_version(&plan.target_version)
                    .with_note("not started: batch aborted")
            });

        if aborted {
            warn!(finished = summary.items.len(), "batch aborted by user");
            return Err(EngineError::Aborted(Box::new(summary)));
        }
        Ok(summary)
    }

    /// Remove every id, then let the reconciler update bookkeeping once
    pub async fn uninstall(&self, ids: &[String], reconciler: &StateReconciler) -> Result<Summary> {
        let started = Instant::now();
        info!(items = ids.len(), "uninstalling");

        let report = TaskExecutor::new(self.options.concurrency)
            .run(ids, |_, id| self.uninstall_unit(id, reconciler))
            .await;

        let (summary, _) = finish_summary(report, ids, started, self.options.dry_run, |id| {
            UnitOutcome::new(id, UnitStatus::Skipped).with_note("not started")
        });

        if self.options.dry_run {
            return Ok(summary);
        }

        let removed: Vec<String> = summary
            .with_status(UnitStatus::Removed)
            .map(|o| o.id.clone())
            .collect();
        let reconciler = reconciler.clone();
        let cleanup = tokio::task::spawn_blocking(move || {
            if let Err(e) = reconciler.forget(&removed) {
                warn!(error = %e, "failed to tombstone removed extensions");
            }
            reconciler.reconcile()
        })
        .await;
        match cleanup {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "reconcile after uninstall failed"),
            Err(e) => warn!(error = %e, "reconcile task failed"),
        }

        Ok(summary)
    }

    async fn update_unit(&self, plan: &ChangePlan) -> (UnitOutcome, Flow) {
        let started = Instant::now();

        if self.options.dry_run {
            debug!(id = %plan.id, target = %plan.target_version, "dry run");
            return (
                UnitOutcome::new(&plan.id, UnitStatus::Skipped)
                    .with_version(&plan.target_version)
                    .with_note("dry run"),
                Flow::Continue,
            );
        }

        let backup_ref = self.backup_before_update(plan).await;

        let ctx = RetryContext::new(
            &plan.id,
            self.options.install_timeout,
            self.options.max_attempts,
        )
        .with_metadata(RetryMetadata {
            supports_download_only: self.options.download_only_fallback,
            unattended: self.options.unattended,
            ..Default::default()
        });

        // The package is fetched once per unit and reused by later attempts
        let fetched: Mutex<Option<PathBuf>> = Mutex::new(None);
        let report = self
            .chain
            .run(ctx, |ctx| self.attempt(plan, ctx, &fetched))
            .await;

        let mut flow = Flow::Continue;
        let mut outcome = match &report.result {
            Ok(Applied::Installed) => UnitOutcome::new(&plan.id, UnitStatus::Updated),
            Ok(Applied::Downloaded(path)) => UnitOutcome::new(&plan.id, UnitStatus::Skipped)
                .with_note(format!("downloaded to {}; install skipped", path.display())),
            Err(RetryError::Aborted { error, .. }) => {
                flow = Flow::AbortBatch;
                UnitOutcome::failed(&plan.id, format!("aborted by user: {}", error))
            }
            Err(err) => UnitOutcome::failed(&plan.id, err.error().message.clone()),
        };
        outcome.version = Some(plan.target_version.clone());
        outcome.elapsed_ms = started.elapsed().as_millis() as u64;
        outcome.attempts = report.attempts();
        outcome.strategy = report.last_strategy().map(str::to_string);
        outcome.backup_ref = backup_ref;

        match outcome.status {
            UnitStatus::Failed => warn!(
                id = %plan.id,
                attempts = outcome.attempts,
                error = outcome.error.as_deref().unwrap_or_default(),
                "update failed"
            ),
            status => info!(
                id = %plan.id,
                from = %plan.current_version,
                to = %plan.target_version,
                %status,
                attempts = outcome.attempts,
                "unit finished"
            ),
        }

        (outcome, flow)
    }

    /// One attempt: fetch (cached), then apply the way the context says
    async fn attempt(
        &self,
        plan: &ChangePlan,
        ctx: RetryContext,
        fetched: &Mutex<Option<PathBuf>>,
    ) -> std::result::Result<Applied, OperationError> {
        let cached = fetched
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .filter(|path| path.exists());

        let package = match cached {
            Some(path) => path,
            None => {
                let path = self.fetch(plan).await?;
                if let Ok(mut guard) = fetched.lock() {
                    *guard = Some(path.clone());
                }
                path
            }
        };

        if ctx.metadata.skip_install {
            return Ok(Applied::Downloaded(package));
        }

        match ctx.metadata.install_path {
            InstallPath::Direct => {
                self.direct
                    .install(&package, &plan.id, &plan.target_version)
                    .await?;
            }
            InstallPath::Standard => {
                let options = InstallOptions {
                    force_reinstall: true,
                    timeout: ctx.timeout,
                };
                let output = self.cli.install(&self.paths.binary, &package, options).await;
                if !output.success {
                    return Err(output.install_error());
                }
            }
        }
        Ok(Applied::Installed)
    }

    /// Try each registry in preference order; the last error wins
    async fn fetch(&self, plan: &ChangePlan) -> std::result::Result<PathBuf, OperationError> {
        let mut last_error = None;
        for source in self
            .options
            .preferred_source
            .preference_order(self.options.source_fallback)
        {
            match self
                .registry
                .fetch(&plan.id, &plan.target_version, source)
                .await
            {
                Ok(path) => {
                    debug!(id = %plan.id, %source, path = %path.display(), "fetched");
                    return Ok(path);
                }
                Err(e) => {
                    debug!(id = %plan.id, %source, error = %e, "fetch failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| OperationError::not_found(format!("no source for {}", plan.id))))
    }

    /// Snapshot the current install; failures are logged and ignored
    async fn backup_before_update(&self, plan: &ChangePlan) -> Option<BackupRef> {
        if !self.options.backup_enabled {
            return None;
        }
        let service = self.backup.as_ref()?;
        let install_path = self.current_install_path(plan)?;

        let note = format!("before update to {}", plan.target_version);
        match service
            .backup(
                &install_path,
                &plan.id,
                &plan.current_version,
                self.paths.editor,
                Some(&note),
            )
            .await
        {
            Ok(backup) => {
                debug!(id = %plan.id, backup = %backup, "backup created");
                Some(backup)
            }
            Err(e) => {
                warn!(id = %plan.id, error = %e, "backup failed; continuing without one");
                None
            }
        }
    }

    fn current_install_path(&self, plan: &ChangePlan) -> Option<PathBuf> {
        if let Some(path) = plan.install_path.as_ref().filter(|p| p.is_dir()) {
            return Some(path.clone());
        }
        let guess = self.paths.extensions_dir.join(format!(
            "{}-{}",
            plan.id.to_lowercase(),
            plan.current_version
        ));
        guess.is_dir().then_some(guess)
    }

    async fn uninstall_unit(&self, id: &str, reconciler: &StateReconciler) -> (UnitOutcome, Flow) {
        let started = Instant::now();
        let finish = |outcome: UnitOutcome| {
            (
                outcome.with_elapsed_ms(started.elapsed().as_millis() as u64),
                Flow::Continue,
            )
        };

        if !is_valid_extension_id(id) {
            return finish(UnitOutcome::failed(
                id,
                format!("invalid extension id: {}", id),
            ));
        }
        if self.options.dry_run {
            return finish(UnitOutcome::new(id, UnitStatus::Skipped).with_note("dry run"));
        }

        let output = self.cli.uninstall(&self.paths.binary, id).await;
        if !output.success {
            debug!(id = %id, error = %output.failure_text(), "editor CLI uninstall failed");
        }

        // Directory removal is what decides the outcome
        let remover = reconciler.clone();
        let target = id.to_string();
        let removed =
            tokio::task::spawn_blocking(move || remover.remove_directories(&target)).await;

        let outcome = match removed {
            Ok(Ok(dirs)) if !dirs.is_empty() || output.success => {
                info!(id = %id, dirs = dirs.len(), "uninstalled");
                UnitOutcome::new(id, UnitStatus::Removed)
            }
            Ok(Ok(_)) => UnitOutcome::failed(id, output.failure_text()),
            Ok(Err(e)) => UnitOutcome::failed(id, e.to_string()),
            Err(e) => UnitOutcome::failed(id, format!("uninstall task failed: {}", e)),
        };
        finish(outcome)
    }
}

/// Fold a pool report into a summary; unstarted items get `unstarted(item)`
///
/// Returns the summary and whether the batch was aborted.
fn finish_summary<I>(
    report: ExecutionReport<UnitOutcome>,
    items: &[I],
    started: Instant,
    dry_run: bool,
    unstarted: impl Fn(&I) -> UnitOutcome,
) -> (Summary, bool) {
    let aborted = report.aborted;
    let never_started = report.unstarted.clone();

    let mut summary = Summary {
        to_update: items.len(),
        dry_run,
        ..Default::default()
    };
    for outcome in report.into_ordered() {
        summary.record(outcome);
    }
    for index in never_started {
        summary.record(unstarted(&items[index]));
    }
    summary.elapsed_ms = started.elapsed().as_millis() as u64;

    (summary, aborted)
}
