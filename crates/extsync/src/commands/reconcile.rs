//! Reconcile command: rebuild editor bookkeeping from disk

use anyhow::Result;
use extsync_extensions::{ReconcileReport, StateReconciler};

use super::Session;
use crate::output;

pub async fn run(session: Session) -> Result<()> {
    let reconciler = StateReconciler::new(&session.paths.extensions_dir);
    let report = tokio::task::spawn_blocking(move || reconciler.reconcile()).await??;

    print_report(&session, &report);
    Ok(())
}

fn print_report(session: &Session, report: &ReconcileReport) {
    output::header("Reconcile");
    output::kv(
        "Extensions dir",
        &session.paths.extensions_dir.display().to_string(),
    );
    output::kv("Registered", &report.entries.to_string());

    for path in &report.removed_temp {
        output::kv("Removed temp", &path.display().to_string());
    }
    for path in &report.removed_invalid {
        output::kv("Removed invalid", &path.display().to_string());
    }
    if !report.tombstones_cleared.is_empty() {
        output::kv("Un-obsoleted", &report.tombstones_cleared.join(", "));
    }

    if report.changed() {
        output::success("Bookkeeping updated");
    } else {
        output::success("Bookkeeping already consistent");
    }
}
