//! Data store → disk.
//!
//! An export resolves every item visible to one named set or theme, routes
//! each to its working-tree path and writes it through the hash-gated
//! [`atomic_write`]. The exporter knows nothing about the watcher; pausing and
//! draining around the write burst is the service's job.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use themesync_core::{
    router, ContentItem, ContentKind, ContentStore, Descriptor, SetRecord, DEFAULT_GROUP,
};

use crate::error::SyncError;
use crate::writer::{atomic_write, WriteResult};

/// Whether an export touches disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    #[default]
    Write,
    DryRun,
}

impl ExportMode {
    pub fn is_dry_run(self) -> bool {
        matches!(self, ExportMode::DryRun)
    }
}

/// One resolved file of an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub descriptor: Descriptor,
    /// Absolute path under the sync root.
    pub path: PathBuf,
    pub body: String,
}

/// Every file an export of one set would produce, in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    pub kind: ContentKind,
    pub name: String,
    pub files: Vec<PlannedFile>,
    /// Sorted group directories (templates only).
    pub groups: Option<Vec<String>>,
    /// Items whose names cannot be placed in the working tree.
    pub skipped: Vec<String>,
}

/// Result of one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    pub kind: ContentKind,
    pub name: String,
    pub writes: Vec<WriteResult>,
    pub groups: Option<Vec<String>>,
    pub skipped: usize,
    pub exported_at: DateTime<Utc>,
}

impl ExportStats {
    /// Files that actually changed on disk, with the digest written.
    pub fn written(&self) -> impl Iterator<Item = (&Path, &str)> + '_ {
        self.writes.iter().filter_map(|w| match w {
            WriteResult::Written { path, digest } => Some((path.as_path(), digest.as_str())),
            _ => None,
        })
    }

    pub fn written_count(&self) -> usize {
        self.written().count()
    }

    pub fn unchanged_count(&self) -> usize {
        self.writes
            .iter()
            .filter(|w| matches!(w, WriteResult::Unchanged { .. }))
            .count()
    }
}

/// Resolve the files an export of `name` would write, without touching disk.
pub fn plan(
    store: &dyn ContentStore,
    root: &Path,
    kind: ContentKind,
    name: &str,
) -> Result<ExportPlan, SyncError> {
    let set = store
        .find_set(kind, name)?
        .ok_or_else(|| SyncError::UnknownSet {
            kind,
            name: name.to_string(),
        })?;

    let (descriptors, groups) = match kind {
        ContentKind::Template => {
            let (resolved, groups) = resolve_templates(store, &set)?;
            (resolved, Some(groups))
        }
        ContentKind::Stylesheet => (resolve_stylesheets(store, &set)?, None),
    };

    let mut files = Vec::with_capacity(descriptors.len());
    let mut skipped = Vec::new();
    for (descriptor, body) in descriptors {
        match router::build_path(&descriptor) {
            Some(relative) => files.push(PlannedFile {
                descriptor,
                path: root.join(relative),
                body,
            }),
            None => {
                tracing::warn!(item = %descriptor, "skipping item with unusable name");
                skipped.push(descriptor.item_name().unwrap_or_default().to_string());
            }
        }
    }

    Ok(ExportPlan {
        kind,
        name: set.name,
        files,
        groups,
        skipped,
    })
}

/// Export one named set or theme to the working tree.
pub fn export(
    store: &dyn ContentStore,
    root: &Path,
    kind: ContentKind,
    name: &str,
    mode: ExportMode,
) -> Result<ExportStats, SyncError> {
    let plan = plan(store, root, kind, name)?;
    let dry_run = mode.is_dry_run();

    let mut writes: Vec<WriteResult> = Vec::with_capacity(plan.files.len());
    for file in &plan.files {
        match atomic_write(&file.path, &file.body, dry_run) {
            Ok(result) => writes.push(result),
            Err(err) => {
                tracing::error!(
                    path = %file.path.display(),
                    error = %err,
                    completed = writes.len(),
                    "export aborted",
                );
                return Err(SyncError::PartialExport {
                    completed: writes,
                    failed: file.path.clone(),
                    source: Box::new(err),
                });
            }
        }
    }

    let stats = ExportStats {
        kind,
        name: plan.name,
        writes,
        groups: plan.groups,
        skipped: plan.skipped.len(),
        exported_at: Utc::now(),
    };
    tracing::info!(
        kind = %kind,
        set = %stats.name,
        written = stats.written_count(),
        unchanged = stats.unchanged_count(),
        dry_run,
        "export finished",
    );
    Ok(stats)
}

/// Export every named set or theme of `kind`, in name order. Stops at the
/// first failure.
pub fn export_all(
    store: &dyn ContentStore,
    root: &Path,
    kind: ContentKind,
    mode: ExportMode,
) -> Result<Vec<ExportStats>, SyncError> {
    store
        .list_sets(kind)?
        .iter()
        .map(|set| export(store, root, kind, &set.name, mode))
        .collect()
}

/// Templates visible to `set`: base, then shared, then the set's own rows,
/// later tiers replacing earlier ones by name.
fn resolve_templates(
    store: &dyn ContentStore,
    set: &SetRecord,
) -> Result<(Vec<(Descriptor, String)>, Vec<String>), SyncError> {
    let kind = ContentKind::Template;
    let base = store.items_in_set(kind, kind.base_set())?;
    let shared = match kind.shared_set() {
        Some(id) => store.items_in_set(kind, id)?,
        None => Vec::new(),
    };
    let named = store.items_in_set(kind, set.id)?;

    let base_groups: BTreeMap<&str, Option<&str>> = base
        .iter()
        .map(|item| (item.name.as_str(), item.group.as_deref()))
        .collect();

    let mut effective: BTreeMap<&str, &ContentItem> = BTreeMap::new();
    for item in base.iter().chain(shared.iter()).chain(named.iter()) {
        effective.insert(item.name.as_str(), item);
    }

    let mut ordered: Vec<(String, &ContentItem)> = effective
        .into_values()
        .map(|item| {
            let group = base_groups
                .get(item.name.as_str())
                .copied()
                .flatten()
                .or(item.group.as_deref())
                .unwrap_or(DEFAULT_GROUP);
            (group.to_string(), item)
        })
        .collect();
    ordered.sort_by(|(ga, a), (gb, b)| ga.cmp(gb).then_with(|| a.name.cmp(&b.name)));

    let groups: BTreeSet<String> = ordered.iter().map(|(g, _)| g.clone()).collect();
    let resolved = ordered
        .into_iter()
        .map(|(group, item)| {
            (
                Descriptor::template(set.name.as_str(), group, item.name.as_str()),
                item.body.clone(),
            )
        })
        .collect();

    Ok((resolved, groups.into_iter().collect()))
}

/// Stylesheets owned by the theme itself. Base-theme rows are not merged in.
fn resolve_stylesheets(
    store: &dyn ContentStore,
    theme: &SetRecord,
) -> Result<Vec<(Descriptor, String)>, SyncError> {
    let mut items = store.items_in_set(ContentKind::Stylesheet, theme.id)?;
    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items
        .into_iter()
        .map(|item| {
            (
                Descriptor::stylesheet(theme.name.as_str(), item.name),
                item.body,
            )
        })
        .collect())
}
