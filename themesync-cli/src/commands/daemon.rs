//! `themesync watch|start|stop` — foreground daemon and its control socket.

use anyhow::{Context, Result};

use themesync_core::SyncConfig;
use themesync_daemon::{request_start, request_stop, start_blocking, DaemonError};

/// Run the daemon in the foreground until `themesync stop` or ctrl-c.
pub fn watch(config: SyncConfig) -> Result<()> {
    start_blocking(config).context("daemon exited with error")
}

pub fn start(config: &SyncConfig) -> Result<()> {
    match request_start(&config.root) {
        Ok(status) => {
            println!("watching {}", status.root.display());
            Ok(())
        }
        Err(DaemonError::DaemonNotRunning { .. }) => {
            println!("daemon is not running; use `themesync watch`");
            Ok(())
        }
        Err(err) => Err(err).context("failed to start watcher"),
    }
}

pub fn stop(config: &SyncConfig) -> Result<()> {
    match request_stop(&config.root) {
        Ok(()) => println!("daemon stop requested"),
        Err(DaemonError::DaemonNotRunning { .. }) => println!("daemon is not running"),
        Err(err) => return Err(err).context("failed to stop daemon"),
    }
    Ok(())
}
