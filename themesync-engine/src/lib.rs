//! # themesync-engine
//!
//! Export and import between the data store and the working tree.
//!
//! Call [`exporter::export`] to write every item visible to a named set, or
//! [`Importer::import`] to upsert one edited file back into the data store.

pub mod cache;
pub mod diff;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod pipeline;
pub mod writer;

pub use cache::{CacheEvent, CacheSignal, ChannelSignal, LogSignal, NoopSignal};
pub use error::{ErrorClass, SignalError, SyncError};
pub use exporter::{export, export_all, ExportMode, ExportStats};
pub use importer::{ImportOutcome, Importer};
pub use pipeline::ExportScope;
pub use writer::{digest, WriteResult};
