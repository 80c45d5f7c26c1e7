//! Check command: which extensions have a newer version

use anyhow::Result;
use extsync_core::types::{ChangePlan, UnitOutcome};
use extsync_extensions::UpdatePlan;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use super::{selection, Session};
use crate::cli::CheckArgs;
use crate::output;

#[derive(Tabled)]
pub(crate) struct PlanRow {
    extension: String,
    installed: String,
    latest: String,
    #[tabled(rename = "")]
    forced: String,
}

impl From<&ChangePlan> for PlanRow {
    fn from(plan: &ChangePlan) -> Self {
        Self {
            extension: plan.id.clone(),
            installed: plan.current_version.clone(),
            latest: plan.target_version.clone(),
            forced: if plan.forced {
                "reinstall".to_string()
            } else {
                String::new()
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport<'a> {
    total_detected: usize,
    updates: &'a [ChangePlan],
    up_to_date: Vec<&'a str>,
    failed: &'a [UnitOutcome],
}

pub async fn run(mut session: Session, args: CheckArgs) -> Result<()> {
    if args.prerelease {
        session.config.resolution.prefer_prerelease = true;
    }
    if let Some(source) = args.source {
        session.config.sources.preferred = Some(source);
    }

    let updater = session.updater(None)?;
    let selected = selection(&args.ids);

    let spinner = (!args.json).then(|| output::spinner("Checking for updates..."));
    let plan = updater.check(selected.as_deref()).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let plan = plan?;

    if args.json {
        let report = CheckReport {
            total_detected: plan.total_detected,
            updates: &plan.plans,
            up_to_date: plan.up_to_date.iter().map(|o| o.id.as_str()).collect(),
            failed: &plan.failed,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_plan(&plan);
    Ok(())
}

/// Table of pending changes plus lookup failures
pub(crate) fn print_plan(plan: &UpdatePlan) {
    if plan.plans.is_empty() {
        output::success(&format!(
            "All {} extension(s) are up to date",
            plan.up_to_date.len()
        ));
    } else {
        let rows: Vec<PlanRow> = plan.plans.iter().map(PlanRow::from).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{}", table);
        output::info(&format!(
            "{} update(s) available, {} up to date",
            plan.plans.len(),
            plan.up_to_date.len()
        ));
    }

    for failed in &plan.failed {
        output::warning(&format!(
            "{}: {}",
            failed.id,
            failed.error.as_deref().unwrap_or("lookup failed")
        ));
    }
}
