//! Disk → data store.
//!
//! An import takes one file's descriptor and content and upserts it into the
//! owning named set. A set that has never overridden an item gets a new row on
//! its first edit; the base and shared tiers are never written from here.

use std::sync::Arc;

use serde::Serialize;

use themesync_core::{
    router, ContentKind, ContentStore, Descriptor, ItemId, NewItem, DEFAULT_GROUP,
};

use crate::cache::{CacheEvent, CacheSignal};
use crate::error::SyncError;

/// What an import did to the data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    /// A new named-set row was inserted.
    Created { id: ItemId },
    /// An existing named-set row got a new body.
    Updated { id: ItemId, revision: i64 },
    /// The named-set row already held this content.
    Unchanged { id: ItemId },
    /// The path did not route to any content kind.
    Ignored,
}

impl ImportOutcome {
    pub fn is_mutation(&self) -> bool {
        matches!(self, ImportOutcome::Created { .. } | ImportOutcome::Updated { .. })
    }
}

/// Upserts files into the data store and announces the change.
#[derive(Clone)]
pub struct Importer {
    store: Arc<dyn ContentStore>,
    signal: Arc<dyn CacheSignal>,
}

impl Importer {
    pub fn new(store: Arc<dyn ContentStore>, signal: Arc<dyn CacheSignal>) -> Self {
        Self { store, signal }
    }

    pub fn import(
        &self,
        descriptor: &Descriptor,
        content: &str,
    ) -> Result<ImportOutcome, SyncError> {
        let (kind, set_name, item_name, group) = match descriptor {
            Descriptor::Template {
                set_name,
                group_name,
                item_name,
            } => (
                ContentKind::Template,
                set_name,
                item_name,
                Some(group_name.as_str()).filter(|g| *g != DEFAULT_GROUP),
            ),
            Descriptor::Stylesheet {
                theme_name,
                item_name,
            } => (ContentKind::Stylesheet, theme_name, item_name, None),
            Descriptor::Unrecognized { raw_path } => {
                tracing::trace!(path = %raw_path.display(), "ignoring unrecognized path");
                return Ok(ImportOutcome::Ignored);
            }
        };

        if content.is_empty() {
            return Err(SyncError::EmptyContent {
                descriptor: descriptor.clone(),
            });
        }
        if router::build_path(descriptor).is_none() {
            return Err(SyncError::InvalidDescriptor(descriptor.to_string()));
        }

        let set = self
            .store
            .find_set(kind, set_name)?
            .ok_or_else(|| SyncError::UnknownSet {
                kind,
                name: set_name.clone(),
            })?;

        let outcome = match self.store.find_item(kind, set.id, item_name)? {
            Some(existing) if existing.body == content => {
                ImportOutcome::Unchanged { id: existing.id }
            }
            Some(existing) => {
                let updated = self.store.update_body(kind, existing.id, content)?;
                ImportOutcome::Updated {
                    id: updated.id,
                    revision: updated.revision,
                }
            }
            None => {
                let mut new_item = NewItem::new(set.id, item_name.as_str(), content);
                new_item.group = group.map(str::to_string);
                let created = self.store.insert_item(kind, &new_item)?;
                ImportOutcome::Created { id: created.id }
            }
        };

        tracing::debug!(target_item = %descriptor, outcome = ?outcome, "import applied");

        if outcome.is_mutation() {
            let event = CacheEvent {
                kind,
                set_name: set_name.clone(),
                item_name: item_name.clone(),
            };
            if let Err(err) = self.signal.notify(&event) {
                tracing::warn!(error = %err, item = %descriptor, "cache signal failed");
            }
        }

        Ok(outcome)
    }
}
