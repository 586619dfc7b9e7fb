//! Exclusive playback slot.
//!
//! At most one player subprocess is owned at a time. A request that arrives
//! while something is playing is rejected rather than queued. Every failure
//! is logged and reported as a zero-length outcome; playback problems never
//! escalate past this module.

use crate::playback::backend::AudioBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Timing knobs for the playback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackPolicy {
    /// Assumed clip length when probing fails
    pub fallback_duration_ms: u64,
    /// How long to wait for a killed player to exit
    pub kill_timeout_ms: u64,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            fallback_duration_ms: 2_000,
            kill_timeout_ms: 1_000,
        }
    }
}

impl PlaybackPolicy {
    pub fn fallback_duration(&self) -> Duration {
        Duration::from_millis(self.fallback_duration_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }
}

/// How a `play` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Player exited normally; carries the estimated clip length
    Completed(Duration),
    /// Something else was already playing
    Rejected,
    /// The sound file does not exist
    Missing,
    /// Spawn failed or the player exited with an error
    Failed,
    /// Stopped by `stop_current` or the caller's cancellation
    Cancelled,
}

impl PlaybackOutcome {
    /// Estimated elapsed duration; zero unless the clip played to the end.
    pub fn duration(&self) -> Duration {
        match self {
            PlaybackOutcome::Completed(d) => *d,
            _ => Duration::ZERO,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PlaybackOutcome::Completed(_))
    }
}

struct ActivePlayback {
    id: u64,
    stop: CancellationToken,
    exited: watch::Receiver<bool>,
}

/// Owns the single audio-playback subprocess.
pub struct PlaybackSlot {
    backend: Arc<dyn AudioBackend>,
    policy: PlaybackPolicy,
    current: Mutex<Option<ActivePlayback>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl PlaybackSlot {
    pub fn new(backend: Arc<dyn AudioBackend>, policy: PlaybackPolicy) -> Self {
        Self {
            backend,
            policy,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<ActivePlayback>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a playback currently owns the slot.
    pub fn is_playing(&self) -> bool {
        self.lock_current().is_some()
    }

    /// Play `sound` to completion.
    ///
    /// Blocks until the player exits, `stop_current` is called, or `cancel`
    /// fires. Returns immediately with `Rejected` if the slot is taken.
    pub async fn play(&self, sound: &Path, cancel: &CancellationToken) -> PlaybackOutcome {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stop = CancellationToken::new();
        let (exit_tx, exit_rx) = watch::channel(false);
        {
            let mut current = self.lock_current();
            // Checked under the lock so `close` either sees this playback
            // in `stop_current` or this call sees the slot closed.
            if self.closed.load(Ordering::SeqCst) {
                return PlaybackOutcome::Rejected;
            }
            if current.is_some() {
                tracing::debug!(path = %sound.display(), "playback already active, rejecting");
                return PlaybackOutcome::Rejected;
            }
            *current = Some(ActivePlayback {
                id,
                stop: stop.clone(),
                exited: exit_rx,
            });
        }
        let _release = SlotRelease {
            slot: &self.current,
            id,
            exited: exit_tx,
        };

        let path = match resolve(sound) {
            Some(path) => path,
            None => {
                tracing::warn!(path = %sound.display(), "sound file not found");
                return PlaybackOutcome::Missing;
            }
        };

        let estimate = match self.backend.probe_duration(&path).await {
            Some(d) => d,
            None => self.policy.fallback_duration(),
        };

        if cancel.is_cancelled() || stop.is_cancelled() {
            return PlaybackOutcome::Cancelled;
        }

        let mut child = match self.backend.spawn(&path) {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to start audio player: {e}");
                return PlaybackOutcome::Failed;
            }
        };
        tracing::debug!(
            path = %path.display(),
            estimate_ms = estimate.as_millis() as u64,
            "playing sound"
        );

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = stop.cancelled() => None,
            _ = cancel.cancelled() => None,
        };

        match status {
            Some(Ok(status)) if status.success() => PlaybackOutcome::Completed(estimate),
            Some(Ok(status)) => {
                tracing::warn!(path = %path.display(), %status, "audio player exited with error");
                PlaybackOutcome::Failed
            }
            Some(Err(e)) => {
                tracing::warn!(path = %path.display(), "waiting on audio player failed: {e}");
                PlaybackOutcome::Failed
            }
            None => {
                self.kill(&mut child).await;
                PlaybackOutcome::Cancelled
            }
        }
    }

    async fn kill(&self, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            tracing::debug!("audio player already gone: {e}");
        }
        match tokio::time::timeout(self.policy.kill_timeout(), child.wait()).await {
            Ok(_) => tracing::debug!("audio player stopped"),
            Err(_) => tracing::warn!(
                timeout_ms = self.policy.kill_timeout_ms,
                "audio player did not exit after kill, abandoning"
            ),
        }
    }

    /// Kill the running player, if any, and wait (bounded) for the slot to
    /// empty. Idempotent.
    pub async fn stop_current(&self) {
        let active = self
            .lock_current()
            .as_ref()
            .map(|a| (a.id, a.stop.clone(), a.exited.clone()));

        let Some((id, stop, mut exited)) = active else {
            return;
        };

        stop.cancel();
        // Allow the kill wait inside `play` to run its course first.
        let bound = self.policy.kill_timeout() * 2;
        if tokio::time::timeout(bound, exited.wait_for(|done| *done))
            .await
            .is_err()
        {
            tracing::warn!("playback did not finish after stop, abandoning it");
            let mut current = self.lock_current();
            if current.as_ref().map(|a| a.id) == Some(id) {
                *current = None;
            }
        }
    }

    /// Stop any playback and refuse further requests.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop_current().await;
    }
}

/// Frees the slot when a `play` call ends, however it ends.
struct SlotRelease<'a> {
    slot: &'a Mutex<Option<ActivePlayback>>,
    id: u64,
    exited: watch::Sender<bool>,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        let mut current = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.as_ref().map(|a| a.id) == Some(self.id) {
            *current = None;
        }
        let _ = self.exited.send(true);
    }
}

/// Absolute path of `sound` if it names an existing file.
fn resolve(sound: &Path) -> Option<PathBuf> {
    let path = std::path::absolute(sound).ok()?;
    path.is_file().then_some(path)
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::process::Command;

    /// Spawns a real short-lived process and counts spawns.
    pub(crate) struct FakeBackend {
        program: &'static str,
        args: Vec<&'static str>,
        pub spawns: AtomicUsize,
        pub spawned_paths: Mutex<Vec<PathBuf>>,
        pub probe: Option<Duration>,
        pub probe_delay: Option<Duration>,
    }

    impl FakeBackend {
        pub fn new(program: &'static str, args: &[&'static str]) -> Self {
            Self {
                program,
                args: args.to_vec(),
                spawns: AtomicUsize::new(0),
                spawned_paths: Mutex::new(Vec::new()),
                probe: None,
                probe_delay: None,
            }
        }

        pub fn sleeping(secs: &'static str) -> Self {
            Self::new("sleep", &[secs])
        }

        pub fn spawn_count(&self) -> usize {
            self.spawns.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AudioBackend for FakeBackend {
        fn spawn(&self, path: &Path) -> std::io::Result<Child> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            self.spawned_paths.lock().unwrap().push(path.to_path_buf());
            Command::new(self.program)
                .args(&self.args)
                .kill_on_drop(true)
                .spawn()
        }

        async fn probe_duration(&self, _path: &Path) -> Option<Duration> {
            if let Some(delay) = self.probe_delay {
                tokio::time::sleep(delay).await;
            }
            self.probe
        }
    }

    fn sound_file() -> tempfile::NamedTempFile {
        tempfile::Builder::new().suffix(".wav").tempfile().unwrap()
    }

    async fn wait_until_playing(slot: &PlaybackSlot) {
        for _ in 0..200 {
            if slot.is_playing() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("playback never started");
    }

    #[tokio::test]
    async fn test_missing_file_does_not_spawn() {
        let backend = Arc::new(FakeBackend::new("true", &[]));
        let slot = PlaybackSlot::new(backend.clone(), PlaybackPolicy::default());

        let outcome = slot
            .play(Path::new("/no/such/sound.wav"), &CancellationToken::new())
            .await;

        assert_eq!(outcome, PlaybackOutcome::Missing);
        assert_eq!(outcome.duration(), Duration::ZERO);
        assert_eq!(backend.spawn_count(), 0);
        assert!(!slot.is_playing());
    }

    #[tokio::test]
    async fn test_completed_uses_fallback_estimate() {
        let backend = Arc::new(FakeBackend::new("true", &[]));
        let slot = PlaybackSlot::new(backend.clone(), PlaybackPolicy::default());
        let file = sound_file();

        let outcome = slot.play(file.path(), &CancellationToken::new()).await;

        assert_eq!(outcome, PlaybackOutcome::Completed(Duration::from_secs(2)));
        assert_eq!(backend.spawn_count(), 1);
        assert!(backend.spawned_paths.lock().unwrap()[0].is_absolute());
        assert!(!slot.is_playing());
    }

    #[tokio::test]
    async fn test_completed_uses_probed_estimate() {
        let mut backend = FakeBackend::new("true", &[]);
        backend.probe = Some(Duration::from_millis(750));
        let slot = PlaybackSlot::new(Arc::new(backend), PlaybackPolicy::default());
        let file = sound_file();

        let outcome = slot.play(file.path(), &CancellationToken::new()).await;
        assert_eq!(outcome.duration(), Duration::from_millis(750));
    }

    #[tokio::test]
    async fn test_second_play_is_rejected_while_active() {
        let backend = Arc::new(FakeBackend::sleeping("5"));
        let slot = Arc::new(PlaybackSlot::new(backend.clone(), PlaybackPolicy::default()));
        let file = sound_file();
        let path = file.path().to_path_buf();

        let first = {
            let slot = Arc::clone(&slot);
            let path = path.clone();
            tokio::spawn(async move { slot.play(&path, &CancellationToken::new()).await })
        };
        wait_until_playing(&slot).await;
        while backend.spawn_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = slot.play(&path, &CancellationToken::new()).await;
        assert_eq!(second, PlaybackOutcome::Rejected);
        assert_eq!(second.duration(), Duration::ZERO);
        assert_eq!(backend.spawn_count(), 1);

        slot.stop_current().await;
        assert_eq!(first.await.unwrap(), PlaybackOutcome::Cancelled);
        assert!(!slot.is_playing());
    }

    #[tokio::test]
    async fn test_cancellation_kills_player() {
        let backend = Arc::new(FakeBackend::sleeping("5"));
        let slot = PlaybackSlot::new(backend.clone(), PlaybackPolicy::default());
        let file = sound_file();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            })
        };

        let started = std::time::Instant::now();
        let outcome = slot.play(file.path(), &cancel).await;
        canceller.await.unwrap();

        assert_eq!(outcome, PlaybackOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!slot.is_playing());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported_and_slot_freed() {
        let backend = Arc::new(FakeBackend::new("definitely-not-a-real-player", &[]));
        let slot = PlaybackSlot::new(backend, PlaybackPolicy::default());
        let file = sound_file();

        let outcome = slot.play(file.path(), &CancellationToken::new()).await;
        assert_eq!(outcome, PlaybackOutcome::Failed);
        assert!(!slot.is_playing());
    }

    #[tokio::test]
    async fn test_player_error_exit_is_failed() {
        let backend = Arc::new(FakeBackend::new("false", &[]));
        let slot = PlaybackSlot::new(backend, PlaybackPolicy::default());
        let file = sound_file();

        let outcome = slot.play(file.path(), &CancellationToken::new()).await;
        assert_eq!(outcome, PlaybackOutcome::Failed);
    }

    #[tokio::test]
    async fn test_stop_current_when_empty_is_noop() {
        let slot = PlaybackSlot::new(
            Arc::new(FakeBackend::new("true", &[])),
            PlaybackPolicy::default(),
        );
        slot.stop_current().await;
        slot.stop_current().await;
        assert!(!slot.is_playing());
    }

    #[tokio::test]
    async fn test_closed_slot_rejects() {
        let backend = Arc::new(FakeBackend::new("true", &[]));
        let slot = PlaybackSlot::new(backend.clone(), PlaybackPolicy::default());
        let file = sound_file();

        slot.close().await;
        let outcome = slot.play(file.path(), &CancellationToken::new()).await;
        assert_eq!(outcome, PlaybackOutcome::Rejected);
        assert_eq!(backend.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_close_before_spawn_cancels_reserved_play() {
        let mut backend = FakeBackend::sleeping("5");
        backend.probe_delay = Some(Duration::from_millis(200));
        let backend = Arc::new(backend);
        let slot = Arc::new(PlaybackSlot::new(backend.clone(), PlaybackPolicy::default()));
        let file = sound_file();
        let path = file.path().to_path_buf();

        let pending = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.play(&path, &CancellationToken::new()).await })
        };
        wait_until_playing(&slot).await;
        assert_eq!(backend.spawn_count(), 0);

        slot.close().await;

        assert_eq!(pending.await.unwrap(), PlaybackOutcome::Cancelled);
        assert_eq!(backend.spawn_count(), 0);
        assert!(!slot.is_playing());
    }
}
