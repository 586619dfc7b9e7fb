//! Filesystem watch source.
//!
//! Recursively watches the configured directories and turns every
//! create/modify/remove/rename notification into an [`ActivityEvent`] on a
//! bounded channel. Which file changed is irrelevant; only the timing is
//! kept.

use crate::coordinator::{ActivityCoordinator, NotifyOutcome};
use crate::core::ActivityEvent;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Capacity of the notification channel. Overflow is dropped, which matches
/// what the coordinator would do with it anyway.
const CHANNEL_CAPACITY: usize = 1_024;

/// How often the dispatch loop checks for shutdown while idle.
const DISPATCH_POLL: Duration = Duration::from_millis(100);

/// Errors that can occur while setting up the watch.
#[derive(Debug)]
pub enum WatchError {
    /// The source is already watching
    AlreadyRunning,
    /// None of the configured directories could be watched
    NoTargets,
    /// The platform watcher could not be created
    Notify(notify::Error),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchError::AlreadyRunning => write!(f, "Watcher is already running"),
            WatchError::NoTargets => write!(f, "No valid directories to watch"),
            WatchError::Notify(e) => write!(f, "Could not create filesystem watcher: {e}"),
        }
    }
}

impl std::error::Error for WatchError {}

/// Whether a notification kind counts as disk activity.
pub fn is_activity(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Watches directories and emits activity events.
pub struct FileWatchSource {
    dirs: Vec<PathBuf>,
    sender: Sender<ActivityEvent>,
    receiver: Receiver<ActivityEvent>,
    watcher: Option<RecommendedWatcher>,
    watched: Vec<PathBuf>,
}

impl FileWatchSource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            dirs,
            sender,
            receiver,
            watcher: None,
            watched: Vec::new(),
        }
    }

    /// Register every configured directory.
    ///
    /// Directories that are missing or fail to register are skipped with a
    /// warning. Returns `NoTargets` if nothing could be watched.
    pub fn start(&mut self) -> Result<usize, WatchError> {
        if self.watcher.is_some() {
            return Err(WatchError::AlreadyRunning);
        }

        let sender = self.sender.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if is_activity(&event.kind) => {
                    match sender.try_send(ActivityEvent::now()) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Disconnected(_)) => {
                            tracing::trace!("watch receiver gone, discarding event")
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("watcher error: {e}"),
            }
        })
        .map_err(WatchError::Notify)?;

        let mut watched = Vec::new();
        for dir in &self.dirs {
            if !dir.is_dir() {
                tracing::warn!(path = %dir.display(), "watch directory does not exist, skipping");
                continue;
            }
            match watcher.watch(dir, RecursiveMode::Recursive) {
                Ok(()) => {
                    tracing::info!(path = %dir.display(), "watching directory");
                    watched.push(dir.clone());
                }
                Err(e) => {
                    tracing::warn!(path = %dir.display(), "failed to watch directory: {e}");
                }
            }
        }

        if watched.is_empty() {
            return Err(WatchError::NoTargets);
        }

        let count = watched.len();
        self.watched = watched;
        self.watcher = Some(watcher);
        Ok(count)
    }

    /// Stop watching. Queued events stay readable.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            for dir in &self.watched {
                let _ = watcher.unwatch(dir);
            }
        }
        self.watched.clear();
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Directories currently registered.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    pub fn receiver(&self) -> &Receiver<ActivityEvent> {
        &self.receiver
    }
}

/// Feed events from `receiver` into `coordinator` until `stop` fires or the
/// channel disconnects. Blocking; run it on a blocking task inside the
/// runtime so cycles can be spawned.
pub fn dispatch_events(
    receiver: &Receiver<ActivityEvent>,
    coordinator: &Arc<ActivityCoordinator>,
    stop: &CancellationToken,
) {
    while !stop.is_cancelled() {
        match receiver.recv_timeout(DISPATCH_POLL) {
            Ok(event) => match coordinator.notify(event) {
                NotifyOutcome::Started(_) | NotifyOutcome::Dropped => {}
                NotifyOutcome::ShuttingDown => break,
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("watch source disconnected unexpectedly");
                break;
            }
        }
    }
}
