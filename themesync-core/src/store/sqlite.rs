//! SQLite-backed content store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::schema::initialize_schema;
use super::ContentStore;
use crate::error::StoreError;
use crate::types::{ContentItem, ContentKind, ItemId, NewItem, SetId, SetRecord};

/// Table names and group expression per content kind.
struct Tables {
    sets: &'static str,
    items: &'static str,
    group: &'static str,
}

fn tables(kind: ContentKind) -> Tables {
    match kind {
        ContentKind::Template => Tables {
            sets: "template_sets",
            items: "templates",
            group: "group_name",
        },
        ContentKind::Stylesheet => Tables {
            sets: "themes",
            items: "stylesheets",
            group: "NULL",
        },
    }
}

/// SQLite content store. One connection, serialized behind a mutex.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let open_err = |source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open(path).map_err(open_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(open_err)?;
        initialize_schema(&conn).map_err(open_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Register a named set. Sets are normally created by the host
    /// application; this exists for fixtures and tooling.
    pub fn create_set(&self, kind: ContentKind, name: &str) -> Result<SetRecord, StoreError> {
        let t = tables(kind);
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO {} (name) VALUES (?1)", t.sets),
                params![name],
            )?;
            Ok(SetRecord {
                id: SetId(conn.last_insert_rowid()),
                name: name.to_string(),
            })
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn).map_err(StoreError::from)
    }

    fn item_by_id(
        conn: &Connection,
        kind: ContentKind,
        id: ItemId,
    ) -> rusqlite::Result<Option<ContentItem>> {
        let t = tables(kind);
        conn.query_row(
            &format!(
                "SELECT id, set_id, name, {} AS group_name, body, revision, updated_at
                 FROM {} WHERE id = ?1",
                t.group, t.items
            ),
            params![id.0],
            |row| row_to_item(kind, row),
        )
        .optional()
    }
}

impl ContentStore for SqliteStore {
    fn find_set(&self, kind: ContentKind, name: &str) -> Result<Option<SetRecord>, StoreError> {
        let t = tables(kind);
        let found = self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT id, name FROM {} WHERE name = ?1", t.sets),
                params![name],
                |row| {
                    Ok(SetRecord {
                        id: SetId(row.get(0)?),
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
        })?;
        Ok(found.filter(|set| !kind.is_reserved(set.id)))
    }

    fn list_sets(&self, kind: ContentKind) -> Result<Vec<SetRecord>, StoreError> {
        let t = tables(kind);
        let sets = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, name FROM {} ORDER BY name",
                t.sets
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok(SetRecord {
                    id: SetId(row.get(0)?),
                    name: row.get(1)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(sets
            .into_iter()
            .filter(|set| !kind.is_reserved(set.id))
            .collect())
    }

    fn items_in_set(
        &self,
        kind: ContentKind,
        set_id: SetId,
    ) -> Result<Vec<ContentItem>, StoreError> {
        let t = tables(kind);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, set_id, name, {} AS group_name, body, revision, updated_at
                 FROM {} WHERE set_id = ?1 ORDER BY name",
                t.group, t.items
            ))?;
            let rows = stmt.query_map(params![set_id.0], |row| row_to_item(kind, row))?;
            rows.collect()
        })
    }

    fn find_item(
        &self,
        kind: ContentKind,
        set_id: SetId,
        name: &str,
    ) -> Result<Option<ContentItem>, StoreError> {
        let t = tables(kind);
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT id, set_id, name, {} AS group_name, body, revision, updated_at
                     FROM {} WHERE set_id = ?1 AND name = ?2",
                    t.group, t.items
                ),
                params![set_id.0, name],
                |row| row_to_item(kind, row),
            )
            .optional()
        })
    }

    fn insert_item(&self, kind: ContentKind, item: &NewItem) -> Result<ContentItem, StoreError> {
        let now = Utc::now();
        let group = match kind {
            ContentKind::Template => item.group.clone(),
            ContentKind::Stylesheet => None,
        };
        self.with_conn(|conn| {
            match kind {
                ContentKind::Template => conn.execute(
                    "INSERT INTO templates (set_id, name, group_name, body, revision, updated_at)
                     VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                    params![item.set_id.0, item.name, group, item.body, now.to_rfc3339()],
                )?,
                ContentKind::Stylesheet => conn.execute(
                    "INSERT INTO stylesheets (set_id, name, body, revision, updated_at)
                     VALUES (?1, ?2, ?3, 1, ?4)",
                    params![item.set_id.0, item.name, item.body, now.to_rfc3339()],
                )?,
            };
            Ok(ContentItem {
                id: ItemId(conn.last_insert_rowid()),
                kind,
                set_id: item.set_id,
                name: item.name.clone(),
                group,
                body: item.body.clone(),
                revision: 1,
                updated_at: now,
            })
        })
    }

    fn update_body(
        &self,
        kind: ContentKind,
        id: ItemId,
        body: &str,
    ) -> Result<ContentItem, StoreError> {
        let t = tables(kind);
        let updated = self.with_conn(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE {} SET body = ?2, revision = revision + 1, updated_at = ?3
                     WHERE id = ?1",
                    t.items
                ),
                params![id.0, body, Utc::now().to_rfc3339()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            Self::item_by_id(conn, kind, id)
        })?;
        updated.ok_or(StoreError::ItemNotFound { kind, id })
    }
}

fn row_to_item(kind: ContentKind, row: &Row<'_>) -> rusqlite::Result<ContentItem> {
    let updated_at: String = row.get(6)?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(ContentItem {
        id: ItemId(row.get(0)?),
        kind,
        set_id: SetId(row.get(1)?),
        name: row.get(2)?,
        group: row.get(3)?,
        body: row.get(4)?,
        revision: row.get(5)?,
        updated_at,
    })
}
