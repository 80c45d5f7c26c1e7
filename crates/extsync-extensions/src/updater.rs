//! One-editor facade over planner, coordinator and reconciler
//!
//! `update` runs the whole pipeline: reconcile, list, plan, execute,
//! reconcile. `check` and `apply` split it in two so a caller can show the
//! plan before anything changes. Bookkeeping is reconciled before planning
//! so a half-finished earlier run cannot skew what looks installed, and
//! again after execution because units only touch their own directories.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use extsync_backup::{ArchiveBackup, BackupManifest};
use extsync_core::retry::{InterventionHandler, RetryChain, TracingObserver};
use extsync_core::types::{EngineConfig, InstalledItem, Summary};
use extsync_core::EditorPaths;
use tracing::{info, warn};

use crate::backup::ArchiveBackupService;
use crate::collaborators::{BackupService, EditorCli, InstalledSource, RegistryClient};
use crate::coordinator::{BulkExecutionCoordinator, CoordinatorOptions};
use crate::editor_cli::ProcessEditorCli;
use crate::error::{EngineError, Result};
use crate::installed::ManifestScanner;
use crate::planner::{PlannerOptions, UpdatePlan, UpdatePlanner};
use crate::reconciler::{ReconcileReport, StateReconciler, STAGING_SUFFIX};
use crate::registry_client::HttpRegistryClient;

/// Everything the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn RegistryClient>,
    pub cli: Arc<dyn EditorCli>,
    pub installed: Arc<dyn InstalledSource>,
    pub backup: Option<Arc<dyn BackupService>>,
}

impl Collaborators {
    /// HTTP registries, the editor binary, manifest scanning and tar.gz backups
    pub fn production(config: &EngineConfig, paths: &EditorPaths) -> anyhow::Result<Self> {
        let registry = HttpRegistryClient::new(config, &paths.download_dir)?;
        let backup = config.backup.enabled.then(|| {
            Arc::new(ArchiveBackupService::new(backup_store(config, paths)))
                as Arc<dyn BackupService>
        });

        Ok(Self {
            registry: Arc::new(registry),
            cli: Arc::new(ProcessEditorCli::new()),
            installed: Arc::new(ManifestScanner::new()),
            backup,
        })
    }
}

/// The backup store for `paths`, sized from the config
pub fn backup_store(config: &EngineConfig, paths: &EditorPaths) -> ArchiveBackup {
    ArchiveBackup::new(&paths.backup_dir, config.backup.max_backups)
}

/// Checks, updates and uninstalls extensions of one editor
pub struct ExtensionUpdater {
    paths: EditorPaths,
    installed: Arc<dyn InstalledSource>,
    planner: UpdatePlanner,
    coordinator: BulkExecutionCoordinator,
    reconciler: StateReconciler,
}

impl ExtensionUpdater {
    /// Wire the engine from configuration
    ///
    /// `intervention` is consulted only for attended runs, after the
    /// automatic strategies have had their turn.
    pub fn new(
        config: &EngineConfig,
        paths: EditorPaths,
        collaborators: Collaborators,
        intervention: Option<Arc<dyn InterventionHandler>>,
    ) -> Self {
        let chain = RetryChain::builder()
            .with_standard_strategies(config.retry.network.clone(), intervention)
            .with_observer(TracingObserver::new("extension-update"))
            .build();

        let planner = UpdatePlanner::new(collaborators.registry.clone())
            .with_options(PlannerOptions::from_config(config));

        let mut coordinator = BulkExecutionCoordinator::new(
            paths.clone(),
            collaborators.registry,
            collaborators.cli,
            chain,
        )
        .with_options(CoordinatorOptions::from_config(config));
        if let Some(backup) = collaborators.backup {
            coordinator = coordinator.with_backup(backup);
        }

        let reconciler = StateReconciler::new(&paths.extensions_dir);

        Self {
            paths,
            installed: collaborators.installed,
            planner,
            coordinator,
            reconciler,
        }
    }

    /// What is installed right now
    pub async fn installed(&self) -> Result<Vec<InstalledItem>> {
        let items = self
            .installed
            .list_installed(&self.paths)
            .await
            .with_context(|| {
                format!(
                    "Failed to list extensions in {}",
                    self.paths.extensions_dir.display()
                )
            })?;
        Ok(items)
    }

    /// Plan without executing
    pub async fn check(&self, selection: Option<&[String]>) -> Result<UpdatePlan> {
        self.reconcile_logged("before check").await;
        let installed = self.installed().await?;
        self.planner.plan(installed, selection).await
    }

    /// Plan and execute; the summary covers every detected item
    ///
    /// An aborted batch still comes back as [`EngineError::Aborted`], with
    /// the up-to-date and unresolvable items merged into its summary.
    pub async fn update(&self, selection: Option<&[String]>) -> Result<Summary> {
        let started = Instant::now();
        let plan = self.check(selection).await?;
        self.execute_plan(plan, started).await
    }

    /// Execute a plan obtained from [`check`](Self::check)
    pub async fn apply(&self, plan: UpdatePlan) -> Result<Summary> {
        self.execute_plan(plan, Instant::now()).await
    }

    async fn execute_plan(&self, plan: UpdatePlan, started: Instant) -> Result<Summary> {
        let dry_run = self.coordinator.options().dry_run;

        let result = if plan.plans.is_empty() {
            info!(
                up_to_date = plan.up_to_date.len(),
                failed = plan.failed.len(),
                "nothing to update"
            );
            Ok(Summary {
                dry_run,
                ..Default::default()
            })
        } else {
            self.coordinator.execute(&plan.plans).await
        };

        if !dry_run && !plan.plans.is_empty() {
            self.reconcile_logged("after update").await;
        }

        match result {
            Ok(summary) => Ok(merge_plan(summary, plan, started)),
            Err(EngineError::Aborted(summary)) => Err(EngineError::Aborted(Box::new(merge_plan(
                *summary, plan, started,
            )))),
            Err(e) => Err(e),
        }
    }

    /// Remove `ids` and reconcile bookkeeping once afterwards
    pub async fn uninstall(&self, ids: &[String]) -> Result<Summary> {
        self.coordinator.uninstall(ids, &self.reconciler).await
    }

    /// Rebuild `extensions.json` and `.obsolete` from the directories
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let reconciler = self.reconciler.clone();
        tokio::task::spawn_blocking(move || reconciler.reconcile())
            .await
            .map_err(|e| EngineError::reconcile(self.reconciler.extensions_dir(), e))?
    }

    /// Put a backed-up version back in place of whatever is installed
    pub async fn restore(&self, store: &ArchiveBackup, backup_id: &str) -> Result<BackupManifest> {
        let store = store.clone();
        let reconciler = self.reconciler.clone();
        let backup_id = backup_id.to_string();

        let manifest = tokio::task::spawn_blocking(move || -> anyhow::Result<BackupManifest> {
            let manifest = store.find(&backup_id)?;
            let dir_name = manifest
                .source_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| {
                    format!(
                        "{}-{}",
                        manifest.extension_id.to_lowercase(),
                        manifest.extension_version
                    )
                });

            let dest = reconciler.extensions_dir().join(&dir_name);
            let staging = reconciler
                .extensions_dir()
                .join(format!("{}{}", dir_name, STAGING_SUFFIX));

            // Installed versions stay untouched until the archive checks out
            let restored = match store.restore(&backup_id, &staging) {
                Ok(restored) => restored,
                Err(e) => {
                    if staging.exists() {
                        let _ = std::fs::remove_dir_all(&staging);
                    }
                    return Err(e);
                }
            };

            // Other versions of the id would shadow the restored one
            reconciler.remove_directories(&restored.extension_id)?;
            if dest.exists() {
                std::fs::remove_dir_all(&dest)
                    .with_context(|| format!("Failed to clear {}", dest.display()))?;
            }
            std::fs::rename(&staging, &dest).with_context(|| {
                format!("Failed to move {} into place", staging.display())
            })?;
            Ok(restored)
        })
        .await
        .context("Restore task panicked")??;

        self.reconcile().await?;
        info!(
            id = %manifest.extension_id,
            version = %manifest.extension_version,
            "extension restored from backup"
        );
        Ok(manifest)
    }

    async fn reconcile_logged(&self, when: &str) {
        if let Err(e) = self.reconcile().await {
            warn!(error = %e, "reconcile {} failed", when);
        }
    }
}

/// Fold planning results into the execution summary
fn merge_plan(mut summary: Summary, plan: UpdatePlan, started: Instant) -> Summary {
    let UpdatePlan {
        plans,
        up_to_date,
        failed,
        total_detected,
    } = plan;

    summary.total_detected = total_detected;
    summary.to_update = plans.len();
    for outcome in up_to_date.into_iter().chain(failed) {
        summary.record(outcome);
    }
    summary.elapsed_ms = started.elapsed().as_millis() as u64;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use extsync_core::types::{ChangePlan, UnitOutcome, UnitStatus};

    #[test]
    fn test_merge_plan_counts_every_detected_item() {
        let mut executed = Summary::default();
        executed.record(UnitOutcome::new("pub.a", UnitStatus::Updated));

        let plan = UpdatePlan {
            plans: vec![ChangePlan {
                id: "pub.a".into(),
                current_version: "1.0.0".into(),
                target_version: "1.1.0".into(),
                forced: false,
                install_path: None,
            }],
            up_to_date: vec![UnitOutcome::new("pub.b", UnitStatus::UpToDate)],
            failed: vec![UnitOutcome::failed("pub.c", "404 not found")],
            total_detected: 3,
        };

        let summary = merge_plan(executed, plan, Instant::now());
        assert_eq!(summary.total_detected, 3);
        assert_eq!(summary.to_update, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.up_to_date, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.items.len(), 3);
    }
}
