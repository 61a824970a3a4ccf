//! Repository interface over the host application's content tables.
//!
//! The engine treats the data store as a narrow repository: look sets up by
//! name, read items by set, read one item by name, insert, and update a body.
//! Named-set lookups never return the reserved tier ids, so nothing routed
//! through a set name can write to the base or shared tier.

mod schema;
mod sqlite;

pub use schema::{initialize_schema, SCHEMA_VERSION};
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::types::{ContentItem, ContentKind, ItemId, NewItem, SetId, SetRecord};

pub trait ContentStore: Send + Sync {
    /// Named set (or theme) by exact name. Reserved tiers are never returned.
    fn find_set(&self, kind: ContentKind, name: &str) -> Result<Option<SetRecord>, StoreError>;

    /// All named sets of a kind, ordered by name.
    fn list_sets(&self, kind: ContentKind) -> Result<Vec<SetRecord>, StoreError>;

    /// Every item stored at `set_id`, ordered by name.
    fn items_in_set(&self, kind: ContentKind, set_id: SetId)
        -> Result<Vec<ContentItem>, StoreError>;

    fn find_item(
        &self,
        kind: ContentKind,
        set_id: SetId,
        name: &str,
    ) -> Result<Option<ContentItem>, StoreError>;

    fn insert_item(&self, kind: ContentKind, item: &NewItem) -> Result<ContentItem, StoreError>;

    /// Replace the body of an existing row and bump its revision.
    fn update_body(
        &self,
        kind: ContentKind,
        id: ItemId,
        body: &str,
    ) -> Result<ContentItem, StoreError>;
}
