//! Bulk extension orchestration for extsync
//!
//! This crate handles:
//! - Planning which installed extensions need to change (`planner`)
//! - Running many units with bounded parallelism (`pool`)
//! - Applying plans through the retry chain (`coordinator`)
//! - Rebuilding `extensions.json` and `.obsolete` from disk (`reconciler`)
//! - The collaborators the engine talks to: registries, the editor CLI,
//!   backups and installed-extension discovery
//! - A one-editor facade tying it together (`updater`)

pub mod backup;
pub mod collaborators;
pub mod coordinator;
pub mod direct_install;
pub mod editor_cli;
pub mod error;
pub mod installed;
pub mod planner;
pub mod pool;
pub mod reconciler;
pub mod registry_client;
pub mod updater;

pub use backup::ArchiveBackupService;
pub use collaborators::{
    BackupService, CliOutput, EditorCli, InstallOptions, InstalledSource, RegistryClient,
};
pub use coordinator::{BulkExecutionCoordinator, CoordinatorOptions};
pub use direct_install::DirectInstaller;
pub use editor_cli::ProcessEditorCli;
pub use error::{EngineError, Result};
pub use installed::ManifestScanner;
pub use planner::{dedupe, validate_plans, PlannerOptions, UpdatePlan, UpdatePlanner};
pub use pool::{ExecutionReport, Flow, TaskExecutor};
pub use reconciler::{ReconcileReport, StateReconciler, UninstallCleanup};
pub use registry_client::HttpRegistryClient;
pub use updater::{backup_store, Collaborators, ExtensionUpdater};
