//! Admission state machine between filesystem events and the import queue.
//!
//! ```text
//! Stopped -> Running -> (Paused <-> Running) -> Stopped
//! ```
//!
//! The gate is plain data behind a `std::sync::Mutex`; the notify callback
//! locks it for the duration of one [`Gate::admit`] call. Nothing in here
//! blocks or performs I/O.
//!
//! While `Paused`, jobs are held instead of queued. After an export the
//! service calls [`Gate::drain`] with what the export wrote, then
//! [`Gate::resume`], which replays the held jobs that survived.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;

use themesync_core::Descriptor;

use crate::paths::{DEBOUNCE_RETENTION, HELD_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchState {
    Stopped,
    Running,
    Paused,
}

/// One file ready for import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportJob {
    /// Absolute path under the canonical sync root.
    pub path: PathBuf,
    pub descriptor: Descriptor,
    pub content: String,
    /// SHA-256 of `content`.
    pub digest: String,
}

/// What [`Gate::admit`] did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Pushed onto the import queue.
    Queued,
    /// Held until the current export finishes.
    Held,
    /// Matches what the last export wrote to this path.
    Echo,
    /// Another event for this path was admitted inside the window.
    Debounced,
    /// The watcher is stopped.
    Stopped,
    /// The import worker has gone away.
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Held jobs inspected.
    pub pulled: usize,
    /// Held jobs for paths this export wrote.
    pub discarded: usize,
    /// Held jobs still waiting for replay.
    pub retained: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResumeReport {
    pub replayed: usize,
    pub echoes: usize,
}

#[derive(Debug)]
pub struct Gate {
    state: WatchState,
    queue: Option<mpsc::UnboundedSender<ImportJob>>,
    held: VecDeque<ImportJob>,
    debounce: HashMap<PathBuf, Instant>,
    fingerprints: HashMap<PathBuf, String>,
    window: Duration,
    held_limit: usize,
}

impl Gate {
    pub fn new(window: Duration) -> Self {
        Self {
            state: WatchState::Stopped,
            queue: None,
            held: VecDeque::new(),
            debounce: HashMap::new(),
            fingerprints: HashMap::new(),
            window,
            held_limit: HELD_LIMIT,
        }
    }

    /// Override the held-buffer bound (defaults to [`HELD_LIMIT`]).
    pub fn with_held_limit(mut self, limit: usize) -> Self {
        self.held_limit = limit.max(1);
        self
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// `Stopped -> Running`. Returns `false` if already started.
    pub fn start(&mut self, queue: mpsc::UnboundedSender<ImportJob>) -> bool {
        if self.state != WatchState::Stopped {
            return false;
        }
        self.queue = Some(queue);
        self.state = WatchState::Running;
        true
    }

    /// Any state `-> Stopped`. Drops the queue sender so the worker drains
    /// what it has and exits.
    pub fn stop(&mut self) {
        if !self.held.is_empty() {
            tracing::debug!(held = self.held.len(), "discarding held jobs on stop");
        }
        self.state = WatchState::Stopped;
        self.queue = None;
        self.held.clear();
        self.debounce.clear();
        self.fingerprints.clear();
    }

    /// `Running -> Paused`. Returns `false` when there was nothing to pause.
    pub fn pause(&mut self) -> bool {
        if self.state != WatchState::Running {
            return false;
        }
        self.state = WatchState::Paused;
        true
    }

    pub fn admit(&mut self, job: ImportJob, now: Instant) -> Admission {
        match self.state {
            WatchState::Stopped => Admission::Stopped,
            WatchState::Paused => {
                if self.held.len() >= self.held_limit {
                    if let Some(dropped) = self.held.pop_front() {
                        tracing::warn!(
                            path = %dropped.path.display(),
                            limit = self.held_limit,
                            "held buffer full, dropping oldest event",
                        );
                    }
                }
                self.held.push_back(job);
                Admission::Held
            }
            WatchState::Running => {
                if self.is_echo(&job) {
                    return Admission::Echo;
                }
                if !self.debounce_allows(&job.path, now) {
                    return Admission::Debounced;
                }
                self.enqueue(job)
            }
        }
    }

    /// Record what an export wrote and discard held jobs for those paths.
    ///
    /// Inspects at most `limit` held jobs; the rest stay held and go through
    /// the fingerprint check on [`resume`](Self::resume).
    ///
    /// A gate stopped while the export ran records nothing.
    pub fn drain(&mut self, written: &[(PathBuf, String)], limit: usize) -> DrainReport {
        if self.state == WatchState::Stopped {
            return DrainReport::default();
        }
        for (path, digest) in written {
            self.fingerprints.insert(path.clone(), digest.clone());
        }
        let written_paths: HashSet<&Path> = written.iter().map(|(p, _)| p.as_path()).collect();

        let pulled = self.held.len().min(limit);
        let mut kept = Vec::with_capacity(pulled);
        let mut discarded = 0;
        for job in self.held.drain(..pulled) {
            if written_paths.contains(job.path.as_path()) {
                discarded += 1;
            } else {
                kept.push(job);
            }
        }
        for job in kept.into_iter().rev() {
            self.held.push_front(job);
        }

        DrainReport {
            pulled,
            discarded,
            retained: self.held.len(),
        }
    }

    /// `Paused -> Running`, replaying held jobs.
    ///
    /// Held jobs are coalesced per path, keeping the newest content, and
    /// bypass the debounce window: they were already collapsed while held.
    pub fn resume(&mut self, now: Instant) -> ResumeReport {
        if self.state != WatchState::Paused {
            return ResumeReport::default();
        }
        self.state = WatchState::Running;

        let held = std::mem::take(&mut self.held);
        let mut latest: HashMap<PathBuf, usize> = HashMap::new();
        for (index, job) in held.iter().enumerate() {
            latest.insert(job.path.clone(), index);
        }

        let mut report = ResumeReport::default();
        for (index, job) in held.into_iter().enumerate() {
            if latest.get(&job.path) != Some(&index) {
                continue;
            }
            if self.is_echo(&job) {
                report.echoes += 1;
                continue;
            }
            self.debounce.insert(job.path.clone(), now);
            if self.enqueue(job) == Admission::Queued {
                report.replayed += 1;
            }
        }
        report
    }

    fn is_echo(&mut self, job: &ImportJob) -> bool {
        match self.fingerprints.get(&job.path) {
            Some(digest) if *digest == job.digest => true,
            Some(_) => {
                self.fingerprints.remove(&job.path);
                false
            }
            None => false,
        }
    }

    fn debounce_allows(&mut self, path: &Path, now: Instant) -> bool {
        self.debounce
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) <= DEBOUNCE_RETENTION);
        match self.debounce.get(path) {
            Some(last) if now.saturating_duration_since(*last) < self.window => false,
            _ => {
                self.debounce.insert(path.to_path_buf(), now);
                true
            }
        }
    }

    fn enqueue(&mut self, job: ImportJob) -> Admission {
        let Some(queue) = &self.queue else {
            return Admission::Closed;
        };
        match queue.send(job) {
            Ok(()) => Admission::Queued,
            Err(err) => {
                tracing::warn!(path = %err.0.path.display(), "import queue closed");
                Admission::Closed
            }
        }
    }
}
