//! The sync service: owns the watcher, the import worker, and the
//! pause/export/drain/resume protocol.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use themesync_core::{ContentKind, ContentStore, SqliteStore, SyncConfig};
use themesync_engine::pipeline::ExportScope;
use themesync_engine::{
    export, CacheSignal, ErrorClass, ExportMode, ExportStats, ImportOutcome, Importer, LogSignal,
    SyncError, WriteResult,
};

use crate::error::{io_err, DaemonError};
use crate::gate::{ImportJob, WatchState};
use crate::watcher::{load_job, Skip, Watcher};

/// Snapshot returned by [`SyncService::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub watching: bool,
    pub paused: bool,
    pub root: PathBuf,
    pub last_export: Option<DateTime<Utc>>,
    pub imports_applied: u64,
}

#[derive(Default)]
struct Counters {
    imports_applied: AtomicU64,
    last_export: Mutex<Option<DateTime<Utc>>>,
}

pub struct SyncService {
    root: PathBuf,
    store: Arc<dyn ContentStore>,
    importer: Importer,
    watcher: Arc<Watcher>,
    export_lock: tokio::sync::Mutex<()>,
    counters: Arc<Counters>,
}

/// Everything one paused export produced, including a failure part-way.
struct ExportRun {
    stats: Vec<ExportStats>,
    error: Option<SyncError>,
}

impl ExportRun {
    fn written(&self) -> Vec<(PathBuf, String)> {
        let failed_writes = self
            .error
            .as_ref()
            .map(SyncError::completed_writes)
            .unwrap_or_default();
        self.stats
            .iter()
            .flat_map(|s| s.writes.iter())
            .chain(failed_writes)
            .filter_map(|w| match w {
                WriteResult::Written { path, digest } => Some((path.clone(), digest.clone())),
                _ => None,
            })
            .collect()
    }

    /// Whether any file actually changed on disk.
    fn touched_disk(&self) -> bool {
        !self.written().is_empty()
    }
}

impl SyncService {
    /// Build a service over `root`, creating it if missing.
    pub fn new(
        root: impl AsRef<Path>,
        store: Arc<dyn ContentStore>,
        signal: Arc<dyn CacheSignal>,
    ) -> Result<Self, DaemonError> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
        let root = fs::canonicalize(root).map_err(|e| io_err(root, e))?;

        Ok(Self {
            importer: Importer::new(Arc::clone(&store), signal),
            watcher: Arc::new(Watcher::new(root.clone())),
            root,
            store,
            export_lock: tokio::sync::Mutex::new(()),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Open the SQLite store named by `config` and log cache invalidations.
    pub fn from_config(config: &SyncConfig) -> Result<Self, DaemonError> {
        let store = SqliteStore::open(&config.database)?;
        let signal = LogSignal::new(config.cache_signal_token.clone());
        Self::new(&config.root, Arc::new(store), Arc::new(signal))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start watching. A running service is left as is.
    ///
    /// Must be called from within a tokio runtime: the import worker is
    /// spawned onto it.
    pub fn start(&self) -> Result<ServiceStatus, DaemonError> {
        if let Some(queue) = self.watcher.start()? {
            tokio::spawn(import_worker(
                queue,
                self.importer.clone(),
                Arc::clone(&self.counters),
            ));
        }
        Ok(self.status())
    }

    /// Stop watching. Queued imports still run to completion.
    pub fn stop(&self) -> ServiceStatus {
        self.watcher.stop();
        self.status()
    }

    pub fn status(&self) -> ServiceStatus {
        let state = self.watcher.state();
        ServiceStatus {
            watching: state != WatchState::Stopped,
            paused: state == WatchState::Paused,
            root: self.root.clone(),
            last_export: *self
                .counters
                .last_export
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            imports_applied: self.counters.imports_applied.load(Ordering::Relaxed),
        }
    }

    /// Export one named set or theme with the watcher paused.
    pub async fn export(
        &self,
        kind: ContentKind,
        name: &str,
        mode: ExportMode,
    ) -> Result<ExportStats, DaemonError> {
        let mut stats = self
            .export_scope(kind, ExportScope::Named(name.to_string()), mode)
            .await?;
        stats
            .pop()
            .ok_or_else(|| DaemonError::Protocol(format!("export of '{name}' produced no result")))
    }

    /// Export every named set or theme of `kind` under a single pause.
    pub async fn export_all(
        &self,
        kind: ContentKind,
        mode: ExportMode,
    ) -> Result<Vec<ExportStats>, DaemonError> {
        self.export_scope(kind, ExportScope::All, mode).await
    }

    pub async fn export_scope(
        &self,
        kind: ContentKind,
        scope: ExportScope,
        mode: ExportMode,
    ) -> Result<Vec<ExportStats>, DaemonError> {
        let _serial = self.export_lock.lock().await;
        let guard = (!mode.is_dry_run()).then(|| self.watcher.pause());

        let store = Arc::clone(&self.store);
        let root = self.root.clone();
        let run = tokio::task::spawn_blocking(move || {
            export_blocking(store.as_ref(), &root, kind, &scope, mode)
        })
        .await
        .map_err(|err| DaemonError::Protocol(format!("export task join error: {err}")))?;

        if guard.as_ref().is_some_and(|g| g.is_paused()) {
            let report = self.watcher.drain(&run.written());
            tracing::debug!(
                pulled = report.pulled,
                discarded = report.discarded,
                retained = report.retained,
                "drained export echoes",
            );
        }
        drop(guard);

        if !mode.is_dry_run() && run.touched_disk() {
            *self
                .counters
                .last_export
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        }

        match run.error {
            Some(err) => Err(err.into()),
            None => Ok(run.stats),
        }
    }

    /// Import a single file under the root, applying the watcher's filters.
    pub async fn import_file(&self, path: &Path) -> Result<ImportOutcome, DaemonError> {
        let root = self.root.clone();
        let importer = self.importer.clone();
        let counters = Arc::clone(&self.counters);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || import_path(&root, &importer, &counters, &path))
            .await
            .map_err(|err| DaemonError::Protocol(format!("import task join error: {err}")))?
    }

    /// [`import_file`](Self::import_file) for callers without a runtime.
    pub fn import_file_blocking(&self, path: &Path) -> Result<ImportOutcome, DaemonError> {
        import_path(&self.root, &self.importer, &self.counters, path)
    }
}

fn import_path(
    root: &Path,
    importer: &Importer,
    counters: &Counters,
    path: &Path,
) -> Result<ImportOutcome, DaemonError> {
    let absolute = fs::canonicalize(path).map_err(|e| io_err(path, e))?;
    let job = match load_job(root, &absolute) {
        Ok(job) => job,
        Err(Skip::OutsideRoot) => {
            return Err(DaemonError::OutsideRoot {
                path: absolute,
                root: root.to_path_buf(),
            })
        }
        Err(Skip::Empty(descriptor)) => return Err(SyncError::EmptyContent { descriptor }.into()),
        Err(Skip::Unreadable(err)) => return Err(io_err(absolute, err)),
        Err(Skip::Noise | Skip::NotAFile | Skip::Unrecognized) => {
            return Ok(ImportOutcome::Ignored)
        }
    };

    let outcome = importer.import(&job.descriptor, &job.content)?;
    if outcome.is_mutation() {
        counters.imports_applied.fetch_add(1, Ordering::Relaxed);
    }
    Ok(outcome)
}

fn export_blocking(
    store: &dyn ContentStore,
    root: &Path,
    kind: ContentKind,
    scope: &ExportScope,
    mode: ExportMode,
) -> ExportRun {
    let names = match scope {
        ExportScope::Named(name) => vec![name.clone()],
        ExportScope::All => match store.list_sets(kind) {
            Ok(sets) => sets.into_iter().map(|s| s.name).collect(),
            Err(err) => {
                return ExportRun {
                    stats: Vec::new(),
                    error: Some(err.into()),
                }
            }
        },
    };

    let mut stats = Vec::with_capacity(names.len());
    for name in names {
        match export(store, root, kind, &name, mode) {
            Ok(s) => stats.push(s),
            Err(err) => {
                return ExportRun {
                    stats,
                    error: Some(err),
                }
            }
        }
    }
    ExportRun { stats, error: None }
}

async fn import_worker(
    mut queue: mpsc::UnboundedReceiver<ImportJob>,
    importer: Importer,
    counters: Arc<Counters>,
) {
    while let Some(job) = queue.recv().await {
        let importer = importer.clone();
        let descriptor = job.descriptor.clone();
        let result = tokio::task::spawn_blocking(move || {
            importer.import(&job.descriptor, &job.content)
        })
        .await;

        match result {
            Ok(Ok(outcome)) => {
                if outcome.is_mutation() {
                    counters.imports_applied.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(item = %descriptor, outcome = ?outcome, "imported");
                } else {
                    tracing::debug!(item = %descriptor, outcome = ?outcome, "import was a no-op");
                }
            }
            Ok(Err(err)) => match err.class() {
                ErrorClass::EmptyContent => {
                    tracing::debug!(item = %descriptor, "skipping empty content")
                }
                ErrorClass::Client | ErrorClass::TransientIo => {
                    tracing::warn!(item = %descriptor, error = %err, "import rejected")
                }
                ErrorClass::DataStore => {
                    tracing::error!(item = ?descriptor, error = %err, "import failed, dropping job")
                }
            },
            Err(err) => tracing::error!(item = %descriptor, error = %err, "import task panicked"),
        }
    }
    tracing::debug!("import worker stopped");
}
