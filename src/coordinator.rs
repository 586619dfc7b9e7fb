//! Feedback-cycle orchestration.
//!
//! The coordinator turns filesystem notifications into feedback cycles:
//! classify the activity, start the light, play the matching clip to the
//! end, stop the light. Only one cycle runs at a time. A notification that
//! arrives while a cycle is in flight is dropped, not queued, so a burst of
//! writes cannot stack up an endless run of sounds.
//!
//! ```text
//!  notify ──try_acquire──▶ classify ──▶ light on ──▶ play clip ──▶ light off
//!     │         (busy)
//!     └──────────▶ dropped
//! ```

use crate::core::{ActivityClassification, ActivityEvent, ActivityPolicy, ActivityWindow};
use crate::indicator::IndicatorDriver;
use crate::playback::{PlaybackOutcome, PlaybackSlot};
use crate::stats::{ActivityStats, SharedActivityStats};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Longest `shutdown` waits for an in-flight cycle to unwind.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Clips for each activity level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSet {
    pub short: PathBuf,
    pub long: PathBuf,
}

impl SoundSet {
    pub fn new(short: impl Into<PathBuf>, long: impl Into<PathBuf>) -> Self {
        Self {
            short: short.into(),
            long: long.into(),
        }
    }

    pub fn for_classification(&self, classification: ActivityClassification) -> &Path {
        match classification {
            ActivityClassification::Short => &self.short,
            ActivityClassification::Sustained => &self.long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Cycling,
}

/// What happened during one feedback cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub classification: ActivityClassification,
    pub sound: PathBuf,
    /// `None` when the cycle body faulted
    pub outcome: Option<PlaybackOutcome>,
}

/// Result of a non-blocking `notify`.
#[derive(Debug)]
pub enum NotifyOutcome {
    /// A cycle was started on its own task
    Started(JoinHandle<CycleReport>),
    /// Another cycle was in flight
    Dropped,
    /// The coordinator has been shut down
    ShuttingDown,
}

impl NotifyOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, NotifyOutcome::Started(_))
    }
}

/// Single-flight coordinator for the light and the sound.
pub struct ActivityCoordinator {
    window: Mutex<ActivityWindow>,
    indicator: Arc<IndicatorDriver>,
    playback: Arc<PlaybackSlot>,
    sounds: SoundSet,
    /// One permit: held for the duration of a cycle
    gate: Arc<Semaphore>,
    shutdown: CancellationToken,
    stats: SharedActivityStats,
}

impl ActivityCoordinator {
    pub fn new(
        policy: ActivityPolicy,
        indicator: Arc<IndicatorDriver>,
        playback: Arc<PlaybackSlot>,
        sounds: SoundSet,
    ) -> Self {
        Self {
            window: Mutex::new(ActivityWindow::new(policy)),
            indicator,
            playback,
            sounds,
            gate: Arc::new(Semaphore::new(1)),
            shutdown: CancellationToken::new(),
            stats: Arc::new(ActivityStats::new()),
        }
    }

    /// Report into an existing stats instance.
    pub fn with_stats(mut self, stats: SharedActivityStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &SharedActivityStats {
        &self.stats
    }

    pub fn state(&self) -> CoordinatorState {
        if self.gate.available_permits() > 0 {
            CoordinatorState::Idle
        } else {
            CoordinatorState::Cycling
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Start a cycle for `event` on a new task, or drop it if one is running.
    ///
    /// Never blocks. Must be called from within a Tokio runtime.
    pub fn notify(self: &Arc<Self>, event: ActivityEvent) -> NotifyOutcome {
        if self.is_shutting_down() {
            return NotifyOutcome::ShuttingDown;
        }
        self.stats.record_notification();

        let Some(permit) = self.try_begin() else {
            if self.is_shutting_down() {
                return NotifyOutcome::ShuttingDown;
            }
            return NotifyOutcome::Dropped;
        };

        let this = Arc::clone(self);
        NotifyOutcome::Started(tokio::spawn(async move {
            this.run_cycle(permit, event.at).await
        }))
    }

    /// Run a cycle for `event` to completion on the caller's task.
    ///
    /// Returns `None` without waiting if a cycle is already running or the
    /// coordinator is shutting down.
    pub async fn handle(&self, event: ActivityEvent) -> Option<CycleReport> {
        if self.is_shutting_down() {
            return None;
        }
        self.stats.record_notification();

        let permit = self.try_begin()?;
        Some(self.run_cycle(permit, event.at).await)
    }

    fn try_begin(&self) -> Option<OwnedSemaphorePermit> {
        match Arc::clone(&self.gate).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(TryAcquireError::Closed) => None,
            Err(TryAcquireError::NoPermits) => {
                self.stats.record_dropped();
                tracing::debug!("feedback cycle in progress, dropping notification");
                None
            }
        }
    }

    /// Classify `at`, returning the number of events now in the window.
    fn classify(&self, at: DateTime<Utc>) -> (ActivityClassification, usize) {
        let mut window = self
            .window
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let classification = window.record(at);
        (classification, window.len())
    }

    async fn run_cycle(&self, permit: OwnedSemaphorePermit, at: DateTime<Utc>) -> CycleReport {
        let (classification, recent) = self.classify(at);
        let sound = self.sounds.for_classification(classification).to_path_buf();
        tracing::debug!(
            ?classification,
            recent,
            sound = %sound.display(),
            "feedback cycle starting"
        );

        // The body runs on its own task so a panic in it surfaces as a
        // JoinError here instead of skipping the cleanup below.
        let body = {
            let indicator = Arc::clone(&self.indicator);
            let playback = Arc::clone(&self.playback);
            let cancel = self.shutdown.child_token();
            let sound = sound.clone();
            tokio::spawn(async move {
                indicator.start().await;
                playback.play(&sound, &cancel).await
            })
        };
        let mut cleanup = CycleCleanup {
            indicator: Arc::clone(&self.indicator),
            body: Some(body),
            permit: Some(permit),
        };

        let outcome = match cleanup.join_body().await {
            Some(Ok(outcome)) => Some(outcome),
            Some(Err(e)) => {
                tracing::error!(sound = %sound.display(), "feedback cycle failed: {e}");
                None
            }
            None => None,
        };

        self.indicator.stop().await;
        cleanup.disarm();

        self.stats.record_cycle(classification, outcome);
        tracing::debug!(?classification, ?outcome, "feedback cycle finished");

        CycleReport {
            classification,
            sound,
            outcome,
        }
    }

    /// Refuse new notifications, kill playback, force the light off and
    /// release both devices. Safe to call mid-cycle and more than once.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.playback.stop_current().await;
        self.indicator.stop().await;

        // Close the gate while holding the drained permit, so a notification
        // that slipped past the shutdown check cannot start a cycle later.
        match tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, self.gate.acquire()).await {
            Ok(Ok(permit)) => {
                self.gate.close();
                drop(permit);
            }
            Ok(Err(_)) => {}
            Err(_) => {
                tracing::warn!("feedback cycle still running at shutdown, continuing");
                self.gate.close();
            }
        }

        self.playback.close().await;
        self.indicator.close().await;
        tracing::debug!("coordinator shut down");
    }
}

/// Aborts the cycle body, stops the light and frees the gate if a cycle
/// future is dropped before it reaches its own cleanup.
struct CycleCleanup {
    indicator: Arc<IndicatorDriver>,
    body: Option<JoinHandle<PlaybackOutcome>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl CycleCleanup {
    /// Wait for the body task. The handle is only cleared once it has
    /// completed, so a drop mid-wait still aborts the body.
    async fn join_body(&mut self) -> Option<Result<PlaybackOutcome, JoinError>> {
        let body = self.body.as_mut()?;
        let result = body.await;
        self.body = None;
        Some(result)
    }

    fn disarm(&mut self) {
        self.permit.take();
    }
}

impl Drop for CycleCleanup {
    fn drop(&mut self) {
        let body = self.body.take();
        if let Some(body) = &body {
            body.abort();
        }
        let Some(permit) = self.permit.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let indicator = Arc::clone(&self.indicator);
                handle.spawn(async move {
                    // The body may still be unwinding a late `start`; the
                    // light stop has to come after it.
                    if let Some(body) = body {
                        let _ = body.await;
                    }
                    indicator.stop().await;
                    drop(permit);
                });
            }
            Err(_) => drop(permit),
        }
    }
}
