//! Restore command: put a backed-up extension version back

use anyhow::Result;
use dialoguer::Confirm;
use extsync_extensions::backup_store;

use super::{interactive, Session};
use crate::cli::RestoreArgs;
use crate::output;

pub async fn run(session: Session, args: RestoreArgs) -> Result<()> {
    let store = backup_store(&session.config, &session.paths);
    let manifest = store.find(&args.backup_id)?;

    if !args.yes && interactive() {
        let proceed = Confirm::new()
            .with_prompt(format!(
                "Replace installed {} with {} from {}?",
                manifest.extension_id,
                manifest.extension_version,
                manifest.created_at.format("%Y-%m-%d %H:%M")
            ))
            .default(false)
            .interact()?;
        if !proceed {
            output::info("Cancelled");
            return Ok(());
        }
    }

    let updater = session.updater(None)?;
    let restored = updater.restore(&store, &args.backup_id).await?;
    output::success(&format!(
        "Restored {} {}",
        restored.extension_id, restored.extension_version
    ));
    Ok(())
}
