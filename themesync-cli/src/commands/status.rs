//! `themesync status` — watcher state as reported by the daemon.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use themesync_core::SyncConfig;
use themesync_daemon::paths::socket_path;
use themesync_daemon::{request_status, DaemonError, ServiceStatus};

/// Arguments for `themesync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config: &SyncConfig) -> Result<()> {
        let status = match request_status(&config.root) {
            Ok(status) => Some(status),
            Err(DaemonError::DaemonNotRunning { .. }) => None,
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            let payload = match &status {
                Some(status) => serde_json::json!({ "running": true, "service": status }),
                None => serde_json::json!({
                    "running": false,
                    "socket": socket_path(&config.root).display().to_string(),
                }),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
            );
            return Ok(());
        }

        match status {
            Some(status) => print_status(&status),
            None => println!(
                "{} daemon is not running (root {})",
                "●".red(),
                config.root.display()
            ),
        }
        Ok(())
    }
}

fn print_status(status: &ServiceStatus) {
    let state = if status.paused {
        "paused".yellow()
    } else if status.watching {
        "watching".green()
    } else {
        "stopped".red()
    };
    println!("{} {state}  {}", "●".bold(), status.root.display());

    let last_export = status
        .last_export
        .map(|at| {
            at.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "never".to_string());
    println!("  last export      {last_export}");
    println!("  imports applied  {}", status.imports_applied);
}
