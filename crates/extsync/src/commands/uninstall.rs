//! Uninstall command

use anyhow::{bail, Result};
use dialoguer::Confirm;

use super::{interactive, selection, Session};
use crate::cli::UninstallArgs;
use crate::output;

pub async fn run(mut session: Session, args: UninstallArgs) -> Result<()> {
    if let Some(jobs) = args.jobs {
        session.config.execution.concurrency = jobs.max(1);
    }
    session.config.execution.unattended = true;

    let ids = selection(&args.ids).unwrap_or_default();
    if ids.is_empty() {
        bail!("No extensions given");
    }

    if !args.yes && interactive() {
        let proceed = Confirm::new()
            .with_prompt(format!("Uninstall {}?", ids.join(", ")))
            .default(false)
            .interact()?;
        if !proceed {
            output::info("Cancelled");
            return Ok(());
        }
    }

    let updater = session.updater(None)?;
    let summary = updater.uninstall(&ids).await?;
    output::print_summary(&summary);

    if summary.is_success() {
        output::success(&format!("Removed {} extension(s)", summary.removed));
        Ok(())
    } else {
        bail!(
            "{} extension(s) could not be removed: {}",
            summary.failed,
            summary.failed_ids().join(", ")
        )
    }
}
