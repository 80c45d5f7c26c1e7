//! Update command

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use dialoguer::Confirm;
use extsync_core::retry::InterventionHandler;
use extsync_core::types::Summary;
use extsync_extensions::EngineError;

use super::check::print_plan;
use super::{interactive, selection, Session};
use crate::cli::UpdateArgs;
use crate::output;
use crate::prompt::TerminalPrompt;

pub async fn run(mut session: Session, args: UpdateArgs) -> Result<()> {
    let config = &mut session.config;
    if args.dry_run {
        config.execution.dry_run = true;
    }
    if let Some(jobs) = args.jobs {
        config.execution.concurrency = jobs.max(1);
    }
    if args.no_backup {
        config.backup.enabled = false;
    }
    if args.prerelease {
        config.resolution.prefer_prerelease = true;
    }
    if let Some(source) = args.source {
        config.sources.preferred = Some(source);
    }
    if args.yes || !interactive() {
        config.execution.unattended = true;
    }

    let intervention: Option<Arc<dyn InterventionHandler>> = if config.execution.unattended {
        None
    } else {
        Some(Arc::new(TerminalPrompt::new()))
    };
    let dry_run = config.execution.dry_run;
    let confirm = !config.execution.unattended && !dry_run;

    let updater = session.updater(intervention)?;
    let selected = selection(&args.ids);

    let spinner = output::spinner("Checking for updates...");
    let plan = updater.check(selected.as_deref()).await;
    spinner.finish_and_clear();
    let plan = plan?;

    print_plan(&plan);

    if confirm && !plan.plans.is_empty() {
        let proceed = Confirm::new()
            .with_prompt(format!("Update {} extension(s)?", plan.plans.len()))
            .default(true)
            .interact()?;
        if !proceed {
            output::info("Cancelled");
            return Ok(());
        }
    }

    match updater.apply(plan).await {
        Ok(summary) => finish(&summary, args.summary.as_deref()),
        Err(EngineError::Aborted(summary)) => {
            finish(&summary, args.summary.as_deref())?;
            bail!("Update aborted; extensions not started were left unchanged")
        }
        Err(e) => Err(e.into()),
    }
}

fn finish(summary: &Summary, summary_path: Option<&Utf8Path>) -> Result<()> {
    output::print_summary(summary);

    if let Some(path) = summary_path {
        summary
            .write_json(path.as_std_path())
            .with_context(|| format!("Failed to write summary to {}", path))?;
        output::info(&format!("Summary written to {}", path));
    }

    if summary.is_success() {
        if summary.updated > 0 {
            output::success(&format!("Updated {} extension(s)", summary.updated));
        }
        Ok(())
    } else {
        bail!(
            "{} extension(s) failed: {}",
            summary.failed,
            summary.failed_ids().join(", ")
        )
    }
}
