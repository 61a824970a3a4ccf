//! `themesync diff <kind> <set>` — show unified diffs for what export would write.

use anyhow::{Context, Result};
use clap::Args;

use themesync_core::{ContentKind, SqliteStore, SyncConfig};
use themesync_engine::diff::diff;

/// Arguments for `themesync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Content kind: `template` or `stylesheet`.
    pub kind: ContentKind,

    /// Template set or theme name.
    pub name: String,
}

impl DiffArgs {
    pub fn run(self, config: &SyncConfig) -> Result<()> {
        let store = SqliteStore::open(&config.database)
            .with_context(|| format!("failed to open database {}", config.database.display()))?;

        let result = diff(&store, &config.root, self.kind, &self.name)
            .with_context(|| format!("diff failed for '{}'", self.name))?;

        if result.diffs.is_empty() {
            println!("No differences for '{}'.", result.name);
            return Ok(());
        }

        for diff in result.diffs {
            print!("{}", diff.unified_diff);
            if !diff.unified_diff.ends_with('\n') {
                println!();
            }
        }

        Ok(())
    }
}
