//! themesync core library — content types, path routing, data store, config.
//!
//! - [`types`] — content kinds, tier ids, item records
//! - [`router`] — working-tree path ⇄ [`Descriptor`]
//! - [`store`] — [`ContentStore`] repository trait and [`SqliteStore`]
//! - [`config`] — [`SyncConfig`] from the environment

pub mod config;
pub mod error;
pub mod router;
pub mod store;
pub mod types;

pub use config::SyncConfig;
pub use error::{ConfigError, StoreError};
pub use router::Descriptor;
pub use store::{ContentStore, SqliteStore};
pub use types::{
    ContentItem, ContentKind, ItemId, NewItem, SetId, SetRecord, DEFAULT_GROUP,
    STYLESHEET_BASE_THEME, TEMPLATE_BASE_SET, TEMPLATE_SHARED_SET,
};
