//! Error types for themesync-engine.

use std::path::PathBuf;

use thiserror::Error;

use themesync_core::{ContentKind, Descriptor, StoreError};

use crate::writer::WriteResult;

/// All errors that can arise from export and import operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No named set/theme with that name exists.
    #[error("unknown {} '{}'", .kind.set_label(), .name)]
    UnknownSet { kind: ContentKind, name: String },

    /// A descriptor whose names cannot be placed in the working tree.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Zero-length content; treated as an editor artifact, never a delete.
    #[error("empty content for {descriptor}")]
    EmptyContent { descriptor: Descriptor },

    /// An error from the data store.
    #[error("data store error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file write failed mid-export; `completed` lists what was written.
    #[error(
        "export aborted at {} after {} file(s): {}",
        .failed.display(),
        .completed.len(),
        .source
    )]
    PartialExport {
        completed: Vec<WriteResult>,
        failed: PathBuf,
        #[source]
        source: Box<SyncError>,
    },
}

/// Failure taxonomy used by callers to decide between report, drop and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller mistake: report, never retry.
    Client,
    /// File read/write race; the next save retries naturally.
    TransientIo,
    /// Editor artifact; no-op.
    EmptyContent,
    /// Database failure; drop the job, abort the export.
    DataStore,
}

impl SyncError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::UnknownSet { .. } | SyncError::InvalidDescriptor(_) => ErrorClass::Client,
            SyncError::EmptyContent { .. } => ErrorClass::EmptyContent,
            SyncError::Store(_) => ErrorClass::DataStore,
            SyncError::Io { .. } => ErrorClass::TransientIo,
            SyncError::PartialExport { source, .. } => source.class(),
        }
    }

    /// Files already written when an export failed part-way.
    pub fn completed_writes(&self) -> &[WriteResult] {
        match self {
            SyncError::PartialExport { completed, .. } => completed,
            _ => &[],
        }
    }
}

/// Failure to deliver a cache-invalidation notice. Logged, never propagated.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("cache signal receiver is gone")]
    Closed,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
