//! imesync CLI - deploy, sync and back up input-method configuration
//!
//! This is the main entry point for the imesync command-line interface.

mod cli;
mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use context::AppContext;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // a silent deploy has no foreground caller to read progress
    let silent = matches!(&cli.command, Commands::Deploy(args) if args.silent);
    init_tracing(cli.verbose, cli.quiet || silent);

    if let Err(e) = run(cli).await {
        report_failure(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = AppContext::load(cli.settings.as_deref())?;

    match cli.command {
        Commands::Deploy(args) => commands::deploy::run(args, &ctx).await,
        Commands::Sync => commands::sync::run(&ctx).await,
        Commands::Reset(args) => commands::reset::run(args, &ctx).await,
        Commands::Backup(args) => commands::backup::run(args, &ctx).await,
        Commands::Restore(args) => commands::restore::run(args, &ctx).await,
        Commands::Config(cmd) => commands::config::run(cmd, &ctx).await,
        Commands::Schema(cmd) => commands::schema::run(cmd, &ctx).await,
    }
}

/// Print the failure dialog for `e`
fn report_failure(e: &anyhow::Error) {
    match e.downcast_ref::<imesync_core::Error>() {
        Some(err) => output::error(&err.user_message()),
        None => output::error(&format!("{:#}", e)),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // stage progress is logged at info
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
