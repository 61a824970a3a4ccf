//! Error types for themesync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ContentKind, ItemId};

/// Errors raised by the data store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened or initialised.
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other SQLite failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A previous holder of the connection lock panicked.
    #[error("database connection lock poisoned")]
    Poisoned,

    /// An update targeted a row that no longer exists.
    #[error("{kind} item {id} not found")]
    ItemNotFound { kind: ContentKind, id: ItemId },
}

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' (expected true/false)")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}
