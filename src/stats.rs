//! Activity counters for the current run.
//!
//! Counts notifications and feedback cycles so a summary can be shown at
//! shutdown. Nothing is persisted between runs.

use crate::core::ActivityClassification;
use crate::playback::PlaybackOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current run.
#[derive(Debug)]
pub struct ActivityStats {
    /// Notifications delivered to the coordinator
    notifications_seen: AtomicU64,
    /// Notifications dropped because a cycle was in flight
    notifications_dropped: AtomicU64,
    /// Cycles that played the short clip
    short_cycles: AtomicU64,
    /// Cycles that played the long clip
    sustained_cycles: AtomicU64,
    /// Cycles whose sound did not play to the end
    playback_failures: AtomicU64,
    /// Cycles whose body panicked
    cycle_faults: AtomicU64,
    started_at: DateTime<Utc>,
}

impl ActivityStats {
    pub fn new() -> Self {
        Self {
            notifications_seen: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            short_cycles: AtomicU64::new(0),
            sustained_cycles: AtomicU64::new(0),
            playback_failures: AtomicU64::new(0),
            cycle_faults: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_notification(&self) {
        self.notifications_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished cycle.
    pub fn record_cycle(
        &self,
        classification: ActivityClassification,
        outcome: Option<PlaybackOutcome>,
    ) {
        match classification {
            ActivityClassification::Short => self.short_cycles.fetch_add(1, Ordering::Relaxed),
            ActivityClassification::Sustained => {
                self.sustained_cycles.fetch_add(1, Ordering::Relaxed)
            }
        };
        match outcome {
            Some(o) if o.is_completed() => {}
            Some(PlaybackOutcome::Cancelled) => {}
            Some(_) => {
                self.playback_failures.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.cycle_faults.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            notifications_seen: self.notifications_seen.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            short_cycles: self.short_cycles.load(Ordering::Relaxed),
            sustained_cycles: self.sustained_cycles.load(Ordering::Relaxed),
            playback_failures: self.playback_failures.load(Ordering::Relaxed),
            cycle_faults: self.cycle_faults.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Notifications received: {}\n\
             - Notifications dropped during playback: {}\n\
             - Short activity cycles: {}\n\
             - Sustained activity cycles: {}\n\
             - Playback failures: {}\n\
             - Faulted cycles: {}\n\
             - Uptime: {} seconds",
            stats.notifications_seen,
            stats.notifications_dropped,
            stats.short_cycles,
            stats.sustained_cycles,
            stats.playback_failures,
            stats.cycle_faults,
            stats.uptime_secs
        )
    }
}

impl Default for ActivityStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub notifications_seen: u64,
    pub notifications_dropped: u64,
    pub short_cycles: u64,
    pub sustained_cycles: u64,
    pub playback_failures: u64,
    pub cycle_faults: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

impl StatsSnapshot {
    pub fn total_cycles(&self) -> u64 {
        self.short_cycles + self.sustained_cycles
    }
}

/// Thread-safe shared stats.
pub type SharedActivityStats = Arc<ActivityStats>;
