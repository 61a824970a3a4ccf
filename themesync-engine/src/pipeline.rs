//! Shared export entrypoint used by the CLI and the daemon.

use std::path::Path;

use themesync_core::{ContentKind, ContentStore};

use crate::exporter::{export, export_all, ExportMode, ExportStats};
use crate::SyncError;

/// Which sets an export run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportScope {
    /// Every named set or theme of the kind.
    All,
    /// A single named set or theme.
    Named(String),
}

/// Run an export for a scope.
pub fn run(
    store: &dyn ContentStore,
    root: &Path,
    kind: ContentKind,
    scope: &ExportScope,
    mode: ExportMode,
) -> Result<Vec<ExportStats>, SyncError> {
    match scope {
        ExportScope::All => export_all(store, root, kind, mode),
        ExportScope::Named(name) => Ok(vec![export(store, root, kind, name, mode)?]),
    }
}
