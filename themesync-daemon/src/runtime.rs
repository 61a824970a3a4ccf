use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;

use themesync_core::SyncConfig;
use themesync_engine::pipeline::ExportScope;
use themesync_engine::ExportMode;

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, state_dir, LOG_FORMAT_VAR};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::service::SyncService;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: SyncConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon: watcher (when `auto_start`), control socket, ctrl-c.
pub async fn run(config: SyncConfig) -> Result<(), DaemonError> {
    tracing::info!(config = ?config, "starting themesync daemon");
    let service = Arc::new(SyncService::from_config(&config)?);
    if config.auto_start {
        service.start()?;
    }
    serve(service).await
}

/// Serve the control socket for `service` until a stop request or ctrl-c.
pub async fn serve(service: Arc<SyncService>) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let result = socket_server_task(service, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);
    service.stop();

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn socket_server_task(
    service: Arc<SyncService>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let state = state_dir(service.root());
    fs::create_dir_all(&state).map_err(|e| io_err(&state, e))?;

    let socket = socket_path(service.root());
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let service = Arc::clone(&service);
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, service, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    service: Arc<SyncService>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = dispatch(&service, &request, &shutdown_tx).await;
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn dispatch(
    service: &SyncService,
    request: &DaemonRequest,
    shutdown_tx: &broadcast::Sender<()>,
) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(json!(service.status())),
        "start" => match service.start() {
            Ok(status) => DaemonResponse::ok(json!(status)),
            Err(err) => DaemonResponse::error(err.to_string()),
        },
        "export" => {
            let Some(kind) = request.kind else {
                return DaemonResponse::error("export requires a kind");
            };
            let scope = match &request.name {
                Some(name) => ExportScope::Named(name.clone()),
                None => ExportScope::All,
            };
            let mode = if request.dry_run {
                ExportMode::DryRun
            } else {
                ExportMode::Write
            };
            match service.export_scope(kind, scope, mode).await {
                Ok(stats) => DaemonResponse::ok(json!(stats)),
                Err(err) => {
                    let completed = err.completed_paths();
                    let mut response = DaemonResponse::error(err.to_string());
                    if !completed.is_empty() {
                        response.data = Some(json!({ "completed": completed }));
                    }
                    response
                }
            }
        }
        "stop" => {
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

/// Install the global subscriber. `RUST_LOG` filters (default `info`);
/// `THEMESYNC_LOG_FORMAT=json` selects JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_VAR)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;
    use themesync_core::{ContentKind, ContentStore, NewItem, SqliteStore, TEMPLATE_BASE_SET};
    use themesync_engine::NoopSignal;

    use super::*;
    use crate::protocol::{request_export, request_status, request_stop};

    #[test]
    fn stale_socket_is_removed_before_bind() {
        let tmp = TempDir::new().expect("tmp");
        let socket = tmp.path().join("daemon.sock");
        fs::write(&socket, "").expect("stale file");
        prepare_socket_for_bind(&socket).expect("prepare");
        assert!(!socket.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn socket_status_export_and_stop() {
        let tmp = TempDir::new().expect("tmp");
        let store = SqliteStore::in_memory().expect("store");
        store
            .create_set(ContentKind::Template, "Dark")
            .expect("set");
        store
            .insert_item(
                ContentKind::Template,
                &NewItem::new(TEMPLATE_BASE_SET, "header", "<A/>"),
            )
            .expect("item");
        let service = Arc::new(
            SyncService::new(tmp.path(), Arc::new(store), Arc::new(NoopSignal)).expect("service"),
        );
        let root = service.root().to_path_buf();
        let server = tokio::spawn(serve(Arc::clone(&service)));

        let status_root = root.clone();
        let status = tokio::task::spawn_blocking(move || request_status(&status_root))
            .await
            .expect("join")
            .expect("status");
        assert!(!status.watching);

        let export_root = root.clone();
        let stats = tokio::task::spawn_blocking(move || {
            request_export(&export_root, ContentKind::Template, Some("Dark".into()), false)
        })
        .await
        .expect("join")
        .expect("export");
        assert_eq!(stats.len(), 1);
        assert!(root.join("template_sets/Dark/ungrouped/header.html").exists());

        let stop_root = root.clone();
        tokio::task::spawn_blocking(move || request_stop(&stop_root))
            .await
            .expect("join")
            .expect("stop");
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server exits")
            .expect("join")
            .expect("serve");
        assert!(!crate::paths::socket_path(&root).exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn socket_export_failure_lists_completed_files() {
        let tmp = TempDir::new().expect("tmp");
        let store = SqliteStore::in_memory().expect("store");
        store
            .create_set(ContentKind::Template, "Dark")
            .expect("set");
        for name in ["footer", "header"] {
            store
                .insert_item(
                    ContentKind::Template,
                    &NewItem::new(TEMPLATE_BASE_SET, name, "<x/>"),
                )
                .expect("item");
        }
        let service = Arc::new(
            SyncService::new(tmp.path(), Arc::new(store), Arc::new(NoopSignal)).expect("service"),
        );
        let root = service.root().to_path_buf();
        let group = root.join("template_sets/Dark/ungrouped");
        fs::create_dir_all(group.join("header.html")).expect("blocker");
        let server = tokio::spawn(serve(Arc::clone(&service)));

        let export_root = root.clone();
        let err = tokio::task::spawn_blocking(move || {
            request_export(&export_root, ContentKind::Template, Some("Dark".into()), false)
        })
        .await
        .expect("join")
        .expect_err("export should fail");
        assert!(matches!(err, DaemonError::ExportFailed { .. }), "got: {err}");
        assert_eq!(err.completed_paths(), vec![group.join("footer.html")]);

        let stop_root = root.clone();
        tokio::task::spawn_blocking(move || request_stop(&stop_root))
            .await
            .expect("join")
            .expect("stop");
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server exits")
            .expect("join")
            .expect("serve");
    }
}
