//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use extsync_core::types::{EditorKind, RegistrySource};

/// extsync - bulk maintenance of editor extensions
#[derive(Parser, Debug)]
#[command(name = "extsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file to use instead of ~/.extsync/config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Editor to operate on (vscode, vscode-insiders, cursor, windsurf, vscodium)
    #[arg(short, long, global = true)]
    pub editor: Option<EditorKind>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List extensions with a newer version available
    Check(CheckArgs),

    /// Update installed extensions
    Update(UpdateArgs),

    /// Uninstall extensions
    Uninstall(UninstallArgs),

    /// Repair extensions.json and .obsolete from what is on disk
    Reconcile,

    /// List extension backups
    Backups(BackupsArgs),

    /// Restore an extension from a backup
    Restore(RestoreArgs),

    /// Show version information
    Version(VersionArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Only check these extension ids
    pub ids: Vec<String>,

    /// Consider prerelease versions
    #[arg(long)]
    pub prerelease: bool,

    /// Registry to ask first (open-vsx, marketplace)
    #[arg(long)]
    pub source: Option<RegistrySource>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Only update these extension ids; they are reinstalled even when current
    pub ids: Vec<String>,

    /// Show what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Number of extensions updated at once
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Skip backups of the replaced versions
    #[arg(long)]
    pub no_backup: bool,

    /// Do not ask for confirmation, and never prompt on failures
    #[arg(short, long)]
    pub yes: bool,

    /// Write the run summary as JSON to this file
    #[arg(long)]
    pub summary: Option<Utf8PathBuf>,

    /// Consider prerelease versions
    #[arg(long)]
    pub prerelease: bool,

    /// Registry to ask first (open-vsx, marketplace)
    #[arg(long)]
    pub source: Option<RegistrySource>,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Extension ids to remove
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Number of extensions removed at once
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug)]
pub struct BackupsArgs {
    /// Only list backups of this extension id
    pub id: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Backup id, as shown by `extsync backups`
    pub backup_id: String,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_update_flags() {
        let cli = Cli::parse_from([
            "extsync",
            "--editor",
            "cursor",
            "update",
            "pub.a",
            "pub.b",
            "--dry-run",
            "-j",
            "4",
            "--no-backup",
            "--source",
            "open-vsx",
            "--summary",
            "out/summary.json",
        ]);

        assert_eq!(cli.editor, Some(EditorKind::Cursor));
        let Commands::Update(args) = cli.command else {
            panic!("expected update");
        };
        assert_eq!(args.ids, vec!["pub.a", "pub.b"]);
        assert!(args.dry_run);
        assert_eq!(args.jobs, Some(4));
        assert!(args.no_backup);
        assert!(!args.yes);
        assert_eq!(args.source, Some(RegistrySource::OpenVsx));
        assert_eq!(args.summary, Some(Utf8PathBuf::from("out/summary.json")));
    }

    #[test]
    fn test_uninstall_requires_ids() {
        assert!(Cli::try_parse_from(["extsync", "uninstall"]).is_err());
    }

    #[test]
    fn test_unknown_editor_rejected() {
        assert!(Cli::try_parse_from(["extsync", "--editor", "notepad", "check"]).is_err());
    }
}
