use std::path::{Path, PathBuf};
use std::time::Duration;

/// Minimum spacing between two admitted events for the same path.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Debounce entries older than this are forgotten.
pub const DEBOUNCE_RETENTION: Duration = Duration::from_secs(30);

/// Maximum held jobs inspected by one post-export drain.
pub const DRAIN_LIMIT: usize = 4096;

/// Maximum jobs held while paused; the oldest is dropped beyond this.
pub const HELD_LIMIT: usize = 8192;

pub const STATE_DIR: &str = ".themesync";
pub const DAEMON_SOCKET: &str = "daemon.sock";

/// Environment variable selecting the log formatter (`json` or unset).
pub const LOG_FORMAT_VAR: &str = "THEMESYNC_LOG_FORMAT";

/// Runtime state under the sync root. Dot-prefixed, so the watcher never
/// treats it as content.
pub fn state_dir(root: &Path) -> PathBuf {
    root.join(STATE_DIR)
}

pub fn socket_path(root: &Path) -> PathBuf {
    state_dir(root).join(DAEMON_SOCKET)
}
