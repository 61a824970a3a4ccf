//! `themesync export` — write resolved content into the working tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use themesync_core::{ContentKind, SqliteStore, SyncConfig};
use themesync_daemon::{request_export, DaemonError};
use themesync_engine::pipeline::{self, ExportScope};
use themesync_engine::{ExportMode, ExportStats, WriteResult};

/// Arguments for `themesync export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Content kind: `template` or `stylesheet`.
    pub kind: ContentKind,

    /// Name of the template set or theme (omit when using `--all`).
    pub name: Option<String>,

    /// Export every named set of the kind.
    #[arg(long, conflicts_with = "name")]
    pub all: bool,

    /// Show what would be written without writing any files.
    #[arg(long)]
    pub dry_run: bool,
}

impl ExportArgs {
    pub fn run(self, config: &SyncConfig) -> Result<()> {
        let scope = if self.all {
            ExportScope::All
        } else {
            ExportScope::Named(
                self.name
                    .clone()
                    .context("provide a set name or use --all")?,
            )
        };
        let mode = if self.dry_run {
            ExportMode::DryRun
        } else {
            ExportMode::Write
        };

        // A running daemon must do the export itself so its watcher is paused.
        let named = match &scope {
            ExportScope::Named(name) => Some(name.clone()),
            ExportScope::All => None,
        };
        let results = match request_export(&config.root, self.kind, named, self.dry_run) {
            Ok(results) => results,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let store = SqliteStore::open(&config.database).with_context(|| {
                    format!("failed to open database {}", config.database.display())
                })?;
                match pipeline::run(&store, &config.root, self.kind, &scope, mode) {
                    Ok(results) => results,
                    Err(err) => {
                        print_completed(err.completed_writes().iter().filter_map(|w| match w {
                            WriteResult::Written { path, .. } => Some(path.as_path()),
                            _ => None,
                        }));
                        return Err(err).with_context(|| {
                            format!("export failed for {}", describe(self.kind, &scope))
                        });
                    }
                }
            }
            Err(err) => {
                print_completed(err.completed_paths().iter().map(PathBuf::as_path));
                return Err(err)
                    .with_context(|| format!("export failed for {}", describe(self.kind, &scope)));
            }
        };

        if results.is_empty() {
            println!("No {} sets to export.", self.kind);
        }
        for stats in &results {
            print_stats(stats, self.dry_run);
        }
        Ok(())
    }
}

fn describe(kind: ContentKind, scope: &ExportScope) -> String {
    match scope {
        ExportScope::All => format!("every {}", kind.set_label()),
        ExportScope::Named(name) => format!("{} '{name}'", kind.set_label()),
    }
}

/// Files an aborted export had already written.
fn print_completed<'a>(paths: impl Iterator<Item = &'a Path>) {
    for path in paths {
        println!("  {}  {} (written before the failure)", "✎".yellow(), path.display());
    }
}

fn print_stats(stats: &ExportStats, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let changed = stats
        .writes
        .iter()
        .filter(|r| {
            matches!(
                r,
                WriteResult::Written { .. } | WriteResult::WouldWrite { .. }
            )
        })
        .count();

    if stats.writes.is_empty() {
        println!("{prefix}✓ '{}' — nothing to do", stats.name);
        return;
    }

    println!(
        "{prefix}{} '{}' exported ({} written, {} unchanged)",
        "✓".green(),
        stats.name,
        changed,
        stats.unchanged_count()
    );
    if stats.skipped > 0 {
        println!(
            "  {} {} item(s) skipped: names cannot be used as file names",
            "!".yellow(),
            stats.skipped
        );
    }

    for r in &stats.writes {
        match r {
            WriteResult::Written { path, .. } => println!("  ✎  {}", path.display()),
            WriteResult::WouldWrite { path } => println!("  ~  {}", path.display()),
            WriteResult::Unchanged { path } => println!("  ·  {}", path.display().to_string().dimmed()),
        }
    }
}
