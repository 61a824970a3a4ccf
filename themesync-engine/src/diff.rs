//! Unified diff support for `themesync diff`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;

use themesync_core::{ContentKind, ContentStore};

use crate::exporter::plan;
use crate::writer::{normalize_line_endings, read_existing};
use crate::SyncError;

/// One file whose on-disk content differs from the data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Diff result for one set or theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetDiff {
    pub kind: ContentKind,
    pub name: String,
    pub diffs: Vec<FileDiff>,
}

/// Compare what an export would write against the working tree.
///
/// No files are written. Missing files diff against empty content.
pub fn diff(
    store: &dyn ContentStore,
    root: &Path,
    kind: ContentKind,
    name: &str,
) -> Result<SetDiff, SyncError> {
    let plan = plan(store, root, kind, name)?;

    let mut diffs = Vec::new();
    for file in plan.files {
        let expected = normalize_line_endings(&file.body);
        let on_disk = read_existing(&file.path)?
            .map(|bytes| normalize_line_endings(&String::from_utf8_lossy(&bytes)))
            .unwrap_or_default();
        if on_disk == expected {
            continue;
        }

        let relative = file.path.strip_prefix(root).unwrap_or(file.path.as_path());
        let old_header = format!("a/{}", relative.display());
        let new_header = format!("b/{}", relative.display());
        let unified = TextDiff::from_lines(&on_disk, &expected)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string();

        diffs.push(FileDiff {
            path: file.path,
            unified_diff: unified,
        });
    }

    Ok(SetDiff {
        kind,
        name: plan.name,
        diffs,
    })
}
