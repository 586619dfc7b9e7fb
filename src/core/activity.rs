//! Sliding time window for classifying filesystem activity.
//!
//! Every change notification is reduced to a timestamp. The window keeps
//! the timestamps seen in the trailing `window` duration and reports a
//! burst once enough of them pile up.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default trailing window length.
pub const DEFAULT_WINDOW_MS: u64 = 3_000;

/// Default number of events inside the window that counts as a burst.
pub const DEFAULT_BURST_THRESHOLD: usize = 3;

/// One filesystem notification. Only the observation time matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// When the notification was observed
    pub at: DateTime<Utc>,
}

impl ActivityEvent {
    /// Stamp a new event with the current time.
    pub fn now() -> Self {
        Self { at: Utc::now() }
    }

    pub fn at(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

/// How intense the recent activity has been.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityClassification {
    /// Isolated access; play the short clip
    Short,
    /// Burst of accesses; play the long clip
    Sustained,
}

/// Burst detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityPolicy {
    /// Trailing window length in milliseconds
    pub window_ms: u64,
    /// Retained events needed for a `Sustained` classification
    pub burst_threshold: usize,
}

impl Default for ActivityPolicy {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            burst_threshold: DEFAULT_BURST_THRESHOLD,
        }
    }
}

/// Count-based burst detector over a fixed trailing window.
#[derive(Debug, Clone)]
pub struct ActivityWindow {
    window: Duration,
    burst_threshold: usize,
    /// Oldest first
    events: VecDeque<DateTime<Utc>>,
}

impl ActivityWindow {
    pub fn new(policy: ActivityPolicy) -> Self {
        Self {
            window: Duration::milliseconds(policy.window_ms as i64),
            burst_threshold: policy.burst_threshold.max(1),
            events: VecDeque::new(),
        }
    }

    /// Record an event at `now` and classify the activity it belongs to.
    ///
    /// Timestamps further than the window behind `now` are evicted first.
    /// A `now` earlier than a retained timestamp yields a negative elapsed
    /// time, which never counts as expired.
    pub fn record(&mut self, now: DateTime<Utc>) -> ActivityClassification {
        self.events.push_back(now);
        self.evict(now);

        if self.events.len() >= self.burst_threshold {
            ActivityClassification::Sustained
        } else {
            ActivityClassification::Short
        }
    }

    /// Number of timestamps currently retained.
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        // Out-of-order timestamps can sit behind newer ones, so filter
        // rather than stopping at the first survivor.
        let window = self.window;
        self.events.retain(|t| now - *t <= window);
    }
}

impl Default for ActivityWindow {
    fn default() -> Self {
        Self::new(ActivityPolicy::default())
    }
}
