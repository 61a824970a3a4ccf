//! Filesystem observer for the sync root.
//!
//! The notify callback runs on the observer thread. For each relevant path it
//! filters noise, classifies the path, reads the file and hands an
//! [`ImportJob`] to the [`Gate`]. It never touches the data store; imports
//! happen on the worker that drains the queue.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use notify::event::{ModifyKind, RenameMode};
use notify::{
    recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _,
};
use tokio::sync::mpsc;

use themesync_core::{router, Descriptor};
use themesync_engine::digest;

use crate::error::DaemonError;
use crate::gate::{Admission, DrainReport, Gate, ImportJob, ResumeReport, WatchState};
use crate::paths::{DEBOUNCE_WINDOW, DRAIN_LIMIT};

/// Why a path did not become an [`ImportJob`].
#[derive(Debug)]
pub enum Skip {
    OutsideRoot,
    /// Hidden, editor backup, or scratch file.
    Noise,
    NotAFile,
    Empty(Descriptor),
    Unrecognized,
    Unreadable(io::Error),
}

pub struct Watcher {
    root: PathBuf,
    gate: Arc<Mutex<Gate>>,
    observer: Mutex<Option<RecommendedWatcher>>,
}

impl Watcher {
    /// `root` must already be canonical; event paths are compared against it.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            gate: Arc::new(Mutex::new(Gate::new(DEBOUNCE_WINDOW))),
            observer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WatchState {
        lock(&self.gate).state()
    }

    /// Begin observing. Returns the import queue receiver, or `None` when the
    /// watcher is already running.
    pub fn start(&self) -> Result<Option<mpsc::UnboundedReceiver<ImportJob>>, DaemonError> {
        let mut observer = lock(&self.observer);
        if observer.is_some() {
            return Ok(None);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.gate).start(tx);

        let gate = Arc::clone(&self.gate);
        let root = self.root.clone();
        let started = recommended_watcher(move |event: notify::Result<Event>| match event {
            Ok(event) => handle_event(&root, &gate, &event),
            Err(err) => tracing::warn!(error = %err, "watcher event error"),
        })
        .and_then(|mut w| w.watch(&self.root, RecursiveMode::Recursive).map(|()| w));

        match started {
            Ok(w) => {
                *observer = Some(w);
                tracing::info!(root = %self.root.display(), "watcher started");
                Ok(Some(rx))
            }
            Err(err) => {
                lock(&self.gate).stop();
                Err(err.into())
            }
        }
    }

    /// Stop observing. Idempotent.
    pub fn stop(&self) {
        let mut observer = lock(&self.observer);
        if observer.take().is_some() {
            tracing::info!(root = %self.root.display(), "watcher stopped");
        }
        lock(&self.gate).stop();
    }

    /// Hold events until the returned guard is dropped.
    pub fn pause(self: &Arc<Self>) -> PauseGuard {
        let paused = lock(&self.gate).pause();
        if paused {
            tracing::debug!("watcher paused");
        }
        PauseGuard {
            watcher: Arc::clone(self),
            paused,
        }
    }

    /// Forget held events for `written` paths and remember their digests.
    pub fn drain(&self, written: &[(PathBuf, String)]) -> DrainReport {
        lock(&self.gate).drain(written, DRAIN_LIMIT)
    }

    fn resume(&self) -> ResumeReport {
        let report = lock(&self.gate).resume(Instant::now());
        tracing::debug!(
            replayed = report.replayed,
            echoes = report.echoes,
            "watcher resumed",
        );
        report
    }
}

/// Resumes the watcher when dropped, including on early return or panic.
#[must_use = "the watcher resumes as soon as the guard is dropped"]
pub struct PauseGuard {
    watcher: Arc<Watcher>,
    paused: bool,
}

impl PauseGuard {
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        if self.paused {
            self.watcher.resume();
        }
    }
}

/// Build an import job for `path`, applying the watcher's filters in order.
pub fn load_job(root: &Path, path: &Path) -> Result<ImportJob, Skip> {
    let relative = path.strip_prefix(root).map_err(|_| Skip::OutsideRoot)?;
    if is_noise(relative) {
        return Err(Skip::Noise);
    }

    let meta = fs::metadata(path).map_err(Skip::Unreadable)?;
    if !meta.is_file() {
        return Err(Skip::NotAFile);
    }

    let descriptor = router::parse(relative);
    if !descriptor.is_recognized() {
        return Err(Skip::Unrecognized);
    }
    if meta.len() == 0 {
        return Err(Skip::Empty(descriptor));
    }

    let content = fs::read_to_string(path).map_err(Skip::Unreadable)?;
    if content.is_empty() {
        return Err(Skip::Empty(descriptor));
    }

    Ok(ImportJob {
        path: path.to_path_buf(),
        digest: digest(&content),
        descriptor,
        content,
    })
}

fn handle_event(root: &Path, gate: &Mutex<Gate>, event: &Event) {
    for path in candidate_paths(event) {
        let job = match load_job(root, path) {
            Ok(job) => job,
            Err(Skip::Unreadable(err)) => {
                tracing::debug!(path = %path.display(), error = %err, "dropping unreadable file");
                continue;
            }
            Err(skip) => {
                tracing::trace!(path = %path.display(), reason = ?skip, "event filtered");
                continue;
            }
        };
        let descriptor = job.descriptor.clone();
        let admission = lock(gate).admit(job, Instant::now());
        match admission {
            Admission::Queued => tracing::debug!(item = %descriptor, "queued import"),
            Admission::Closed => tracing::warn!(item = %descriptor, "import queue closed"),
            other => tracing::trace!(item = %descriptor, admission = ?other, "event not queued"),
        }
    }
}

/// Paths of `event` worth classifying. A rename carrying both halves counts
/// only as a write to its destination.
fn candidate_paths(event: &Event) -> &[PathBuf] {
    match event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.get(1..2).unwrap_or(&[])
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => &[],
        EventKind::Create(_) | EventKind::Modify(_) => &event.paths,
        _ => &[],
    }
}

/// Dot-prefixed components, `~` backups, and `.tmp` scratch files.
fn is_noise(relative: &Path) -> bool {
    let hidden = relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    });
    if hidden {
        return true;
    }
    relative
        .file_name()
        .map(|name| {
            let name = name.to_string_lossy();
            name.ends_with('~') || name.ends_with(".tmp")
        })
        .unwrap_or(false)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
