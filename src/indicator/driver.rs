//! Pulsing activity indicator.
//!
//! The driver owns one output line. While active, a background task toggles
//! it through an irregular high/low pattern that looks like a disk seeking.
//! Stopping cancels that task, waits for it (bounded), and always leaves the
//! line low before returning.
//!
//! If the line cannot be opened or a write fails, the driver switches to a
//! disabled mode: `start`/`stop` keep working as no-ops and a single warning
//! is logged, so audio feedback carries on without the light.

use crate::indicator::types::{IndicatorState, Level, LineError, OutputLine, PulsePolicy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The line plus its degrade bookkeeping.
struct LineSlot {
    line: Option<Box<dyn OutputLine>>,
    warned: bool,
}

impl LineSlot {
    fn write(&mut self, level: Level) {
        let result = match self.line.as_mut() {
            Some(line) => line.write(level),
            None => return,
        };
        if let Err(e) = result {
            self.disable(&e);
        }
    }

    fn disable(&mut self, err: &LineError) {
        if let Some(mut line) = self.line.take() {
            let _ = line.close();
        }
        if !self.warned {
            self.warned = true;
            tracing::warn!("activity light disabled, continuing with sound only: {err}");
        }
    }
}

struct PulseTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives the activity light.
pub struct IndicatorDriver {
    line: Arc<Mutex<LineSlot>>,
    policy: PulsePolicy,
    /// Serializes start/stop transitions
    task: tokio::sync::Mutex<Option<PulseTask>>,
    pulsing: AtomicBool,
}

impl IndicatorDriver {
    /// Wrap an opened line. The line is driven low immediately.
    pub fn new(line: Box<dyn OutputLine>, policy: PulsePolicy) -> Self {
        let driver = Self::with_slot(
            LineSlot {
                line: Some(line),
                warned: false,
            },
            policy,
        );
        driver.lock_line().write(Level::Low);
        driver
    }

    /// A driver with no line. Logs the reason once.
    pub fn disabled(reason: &LineError, policy: PulsePolicy) -> Self {
        let driver = Self::with_slot(
            LineSlot {
                line: None,
                warned: false,
            },
            policy,
        );
        driver.lock_line().disable(reason);
        driver
    }

    /// Open a line with `open`, falling back to the disabled driver on error.
    pub fn open_with<F>(open: F, policy: PulsePolicy) -> Self
    where
        F: FnOnce() -> Result<Box<dyn OutputLine>, LineError>,
    {
        match open() {
            Ok(line) => Self::new(line, policy),
            Err(e) => Self::disabled(&e, policy),
        }
    }

    /// Open the platform GPIO `pin`, falling back to the disabled driver.
    pub fn open(pin: u32, policy: PulsePolicy) -> Self {
        Self::open_with(|| crate::indicator::open_line(pin), policy)
    }

    fn with_slot(slot: LineSlot, policy: PulsePolicy) -> Self {
        Self {
            line: Arc::new(Mutex::new(slot)),
            policy,
            task: tokio::sync::Mutex::new(None),
            pulsing: AtomicBool::new(false),
        }
    }

    fn lock_line(&self) -> MutexGuard<'_, LineSlot> {
        lock_slot(&self.line)
    }

    /// Whether a real line is still attached.
    pub fn is_enabled(&self) -> bool {
        self.lock_line().line.is_some()
    }

    pub fn state(&self) -> IndicatorState {
        if self.pulsing.load(Ordering::SeqCst) {
            IndicatorState::Pulsing
        } else {
            IndicatorState::Idle
        }
    }

    /// Begin pulsing. An already running pulse task is stopped first, so at
    /// most one task ever drives the line.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            self.stop_locked(&mut task).await;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pulse_loop(
            Arc::clone(&self.line),
            self.policy,
            cancel.clone(),
        ));
        *task = Some(PulseTask { cancel, handle });
        self.pulsing.store(true, Ordering::SeqCst);
        tracing::trace!("indicator pulsing");
    }

    /// Stop pulsing and force the line low. Safe to call when idle.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        self.stop_locked(&mut task).await;
    }

    async fn stop_locked(&self, task: &mut Option<PulseTask>) {
        if let Some(PulseTask { cancel, mut handle }) = task.take() {
            cancel.cancel();
            match tokio::time::timeout(self.policy.stop_timeout(), &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("pulse task ended abnormally: {e}"),
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.policy.stop_timeout_ms,
                        "pulse task did not stop in time, aborting"
                    );
                    handle.abort();
                }
            }
        }

        self.lock_line().write(Level::Low);
        self.pulsing.store(false, Ordering::SeqCst);
    }

    /// Stop pulsing and release the line.
    pub async fn close(&self) {
        self.stop().await;
        let mut slot = self.lock_line();
        if let Some(mut line) = slot.line.take() {
            if let Err(e) = line.close() {
                tracing::warn!("failed to release activity light: {e}");
            }
        }
    }
}

impl Drop for IndicatorDriver {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
            task.handle.abort();
        }
        let mut slot = lock_slot(&self.line);
        slot.write(Level::Low);
        if let Some(mut line) = slot.line.take() {
            let _ = line.close();
        }
    }
}

fn lock_slot(line: &Mutex<LineSlot>) -> MutexGuard<'_, LineSlot> {
    line.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn pulse_loop(line: Arc<Mutex<LineSlot>>, policy: PulsePolicy, cancel: CancellationToken) {
    while !cancel.is_cancelled() {
        lock_slot(&line).write(Level::High);
        if !pause(&policy, &cancel).await {
            break;
        }
        lock_slot(&line).write(Level::Low);
        if !pause(&policy, &cancel).await {
            break;
        }
    }
}

/// Sleep one random phase. Returns false if cancelled first.
async fn pause(policy: &PulsePolicy, cancel: &CancellationToken) -> bool {
    let delay = policy.random_interval();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
