//! themesync — keep templates and stylesheets in sync with a working tree.
//!
//! # Usage
//!
//! ```text
//! themesync export <template|stylesheet> <set> [--dry-run]
//! themesync export <template|stylesheet> --all [--dry-run]
//! themesync import <file>
//! themesync diff <template|stylesheet> <set>
//! themesync watch
//! themesync start
//! themesync status [--json]
//! themesync stop
//! ```
//!
//! `--root` and `--database` override `SYNC_ROOT` and `SYNC_DATABASE`.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, export::ExportArgs, import::ImportArgs, status::StatusArgs};
use themesync_core::SyncConfig;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "themesync",
    version,
    about = "Synchronize templates and stylesheets between a database and a directory tree",
    long_about = None,
)]
struct Cli {
    /// Working tree root (overrides SYNC_ROOT).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// SQLite database path (overrides SYNC_DATABASE).
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a set's resolved content into the working tree.
    Export(ExportArgs),

    /// Import one edited file into the database.
    Import(ImportArgs),

    /// Show unified diff of what export would write.
    Diff(DiffArgs),

    /// Run the watcher and control socket in the foreground.
    Watch,

    /// Ask a running daemon to start watching.
    Start,

    /// Show watcher state.
    Status(StatusArgs),

    /// Request graceful daemon shutdown.
    Stop,
}

impl Cli {
    fn config(&self) -> Result<SyncConfig> {
        let mut config = SyncConfig::from_env().context("invalid environment configuration")?;
        if let Some(root) = &self.root {
            config = config.with_root(root);
        }
        if let Some(database) = &self.database {
            config = config.with_database(database);
        }
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config()?;
    match cli.command {
        Commands::Export(args) => args.run(&config),
        Commands::Import(args) => args.run(&config),
        Commands::Diff(args) => args.run(&config),
        Commands::Watch => commands::daemon::watch(config),
        Commands::Start => commands::daemon::start(&config),
        Commands::Status(args) => args.run(&config),
        Commands::Stop => commands::daemon::stop(&config),
    }
}
