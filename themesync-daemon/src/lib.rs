//! themesync daemon: filesystem watcher, sync service, control socket.

mod error;
pub mod gate;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod service;
pub mod watcher;

pub use error::DaemonError;
pub use gate::{ImportJob, WatchState};
pub use protocol::{
    request_export, request_start, request_status, request_stop, send_request, DaemonRequest,
    DaemonResponse,
};
pub use runtime::{init_tracing, run, serve, start_blocking};
pub use service::{ServiceStatus, SyncService};
pub use watcher::{PauseGuard, Watcher};
