//! Terminal output utilities

use console::style;
use extsync_core::types::{Summary, UnitOutcome, UnitStatus};
use indicatif::{ProgressBar, ProgressStyle};
use tabled::{
    settings::{object::Columns, Modify, Style, Width},
    Table, Tabled,
};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a header
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Create a spinner
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(spinner_style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

#[derive(Tabled)]
struct OutcomeRow {
    extension: String,
    status: String,
    version: String,
    attempts: String,
    detail: String,
}

impl OutcomeRow {
    fn from_outcome(outcome: &UnitOutcome) -> Self {
        let status = match outcome.status {
            UnitStatus::Updated | UnitStatus::Removed => {
                style(outcome.status.to_string()).green().to_string()
            }
            UnitStatus::UpToDate => style(outcome.status.to_string()).dim().to_string(),
            UnitStatus::Skipped => style(outcome.status.to_string()).yellow().to_string(),
            UnitStatus::Failed => style(outcome.status.to_string()).red().to_string(),
        };
        let detail = outcome
            .error
            .clone()
            .or_else(|| outcome.note.clone())
            .or_else(|| outcome.backup_ref.as_ref().map(|b| format!("backup {}", b)))
            .unwrap_or_default();

        Self {
            extension: outcome.id.clone(),
            status,
            version: outcome.version.clone().unwrap_or_else(|| "-".to_string()),
            attempts: match outcome.attempts {
                0 => "-".to_string(),
                n => n.to_string(),
            },
            detail,
        }
    }
}

/// Per-item table followed by the counters
pub fn print_summary(summary: &Summary) {
    let rows: Vec<OutcomeRow> = summary
        .items
        .iter()
        .filter(|o| o.status != UnitStatus::UpToDate)
        .map(OutcomeRow::from_outcome)
        .collect();

    if !rows.is_empty() {
        let mut table = Table::new(rows);
        table
            .with(Style::rounded())
            .with(Modify::new(Columns::last()).with(Width::wrap(60)));
        println!("{}", table);
    }

    header(if summary.dry_run {
        "Summary (dry run)"
    } else {
        "Summary"
    });
    kv("Detected", &summary.total_detected.to_string());
    kv("Up to date", &summary.up_to_date.to_string());
    if summary.to_update > 0 {
        kv("To update", &summary.to_update.to_string());
        kv("Updated", &summary.updated.to_string());
    }
    if summary.removed > 0 {
        kv("Removed", &summary.removed.to_string());
    }
    kv("Skipped", &summary.skipped.to_string());
    kv("Failed", &summary.failed.to_string());
    kv("Elapsed", &format_elapsed(summary.elapsed_ms));
}

pub fn format_elapsed(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}
