//! `themesync import <file>` — import one file without a running watcher.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use themesync_core::{SqliteStore, SyncConfig};
use themesync_daemon::SyncService;
use themesync_engine::{ImportOutcome, LogSignal};

/// Arguments for `themesync import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// File under the sync root.
    pub file: PathBuf,
}

impl ImportArgs {
    pub fn run(self, config: &SyncConfig) -> Result<()> {
        let store = SqliteStore::open(&config.database)
            .with_context(|| format!("failed to open database {}", config.database.display()))?;
        let signal = LogSignal::new(config.cache_signal_token.clone());
        let service = SyncService::new(&config.root, Arc::new(store), Arc::new(signal))
            .context("failed to prepare sync root")?;

        let outcome = service
            .import_file_blocking(&self.file)
            .with_context(|| format!("import failed for {}", self.file.display()))?;

        let file = self.file.display();
        match outcome {
            ImportOutcome::Created { id } => {
                println!("{} {file} imported as new override (id {id})", "✓".green())
            }
            ImportOutcome::Updated { id, revision } => {
                println!("{} {file} updated (id {id}, revision {revision})", "✓".green())
            }
            ImportOutcome::Unchanged { .. } => println!("· {file} already up to date"),
            ImportOutcome::Ignored => println!(
                "{} {file} is not a template or stylesheet path; ignored",
                "!".yellow()
            ),
        }
        Ok(())
    }
}
