//! extsync - bulk update, uninstall and repair of editor extensions
//!
//! This is the main entry point for the extsync command-line interface.

mod cli;
mod commands;
mod output;
mod prompt;
mod version;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use commands::Session;

#[tokio::main]
async fn main() -> Result<()> {
    // rustls 0.23+ needs a process-wide crypto provider before any TLS
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Commands::Version(args) = cli.command {
        return commands::version::run(args);
    }

    let session = Session::load(cli.config.as_deref(), cli.editor)?;

    match cli.command {
        Commands::Check(args) => commands::check::run(session, args).await,
        Commands::Update(args) => commands::update::run(session, args).await,
        Commands::Uninstall(args) => commands::uninstall::run(session, args).await,
        Commands::Reconcile => commands::reconcile::run(session).await,
        Commands::Backups(args) => commands::backups::run(session, args),
        Commands::Restore(args) => commands::restore::run(session, args).await,
        Commands::Version(args) => commands::version::run(args),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // Terminal output covers progress; logs are for diagnosis
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
