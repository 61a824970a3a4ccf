use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the watcher, the sync service, and the control socket.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("configuration error: {0}")]
    Config(#[from] themesync_core::ConfigError),

    #[error("data store error: {0}")]
    Store(#[from] themesync_core::StoreError),

    #[error(transparent)]
    Sync(#[from] themesync_engine::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path} is outside the sync root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    /// An export run by the daemon failed; `completed` lists files it wrote first.
    #[error("{message}")]
    ExportFailed {
        message: String,
        completed: Vec<PathBuf>,
    },

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

impl DaemonError {
    /// Files written before an export failed part-way.
    pub fn completed_paths(&self) -> Vec<PathBuf> {
        match self {
            DaemonError::Sync(err) => err
                .completed_writes()
                .iter()
                .filter_map(|w| match w {
                    themesync_engine::WriteResult::Written { path, .. } => Some(path.clone()),
                    _ => None,
                })
                .collect(),
            DaemonError::ExportFailed { completed, .. } => completed.clone(),
            _ => Vec::new(),
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
