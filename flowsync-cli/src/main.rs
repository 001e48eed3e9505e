//! flowsync: two-way sync between a local flow tree and the platform.
//!
//! # Usage
//!
//! ```text
//! flowsync pull   [--force] [--verbose] [--customer <idn>] [--root <dir>]
//! flowsync push   [--no-publish] [--force] [--verbose] ...
//! flowsync sync   [--no-publish] [--force] [--verbose] ...
//! flowsync status [--json] [--customer <idn>] [--root <dir>]
//! ```

mod commands;
mod confirm;
mod platform;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    pull::PullArgs, push::PushArgs, status::StatusArgs, sync::SyncArgs, GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "flowsync",
    version,
    about = "Synchronize agent flows and skill scripts with the platform",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download remote projects, flows and skills into the workspace.
    Pull(PullArgs),

    /// Upload local skill changes, creations and deletions.
    Push(PushArgs),

    /// Pull, then push, under one workspace lock.
    Sync(SyncArgs),

    /// Show local changes against the last sync, without network access.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    match cli.command {
        Commands::Pull(args) => args.run(&cli.global),
        Commands::Push(args) => args.run(&cli.global),
        Commands::Sync(args) => args.run(&cli.global),
        Commands::Status(args) => args.run(&cli.global),
    }
}

/// `FLOWSYNC_LOG` wins over `--verbose`. Logs go to stderr so reports on
/// stdout stay machine readable.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("FLOWSYNC_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
