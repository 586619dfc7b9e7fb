//! Shared types for driving the activity indicator line.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Logical level of a digital output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Value written to a sysfs `value` attribute.
    pub fn as_sysfs(&self) -> &'static [u8] {
        match self {
            Level::Low => b"0",
            Level::High => b"1",
        }
    }
}

/// Whether the driver is currently running its pulse pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicatorState {
    /// Line held low
    Idle,
    /// Pulse task toggling the line
    Pulsing,
}

/// Errors raised by an output line.
#[derive(Debug)]
pub enum LineError {
    /// No GPIO support on this platform
    Unsupported,
    /// The line could not be opened or configured
    Open { pin: u32, reason: String },
    /// A level write failed
    Write(std::io::Error),
}

impl std::fmt::Display for LineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LineError::Unsupported => write!(f, "GPIO output is not supported on this platform"),
            LineError::Open { pin, reason } => write!(f, "Could not open GPIO pin {pin}: {reason}"),
            LineError::Write(e) => write!(f, "GPIO write failed: {e}"),
        }
    }
}

impl std::error::Error for LineError {}

/// A digital output the indicator can drive.
///
/// Implementations only need to be movable across threads; the driver
/// serializes every call.
pub trait OutputLine: Send {
    /// Drive the line to `level`.
    fn write(&mut self, level: Level) -> Result<(), LineError>;

    /// Release the line. Called once, after a final low write.
    fn close(&mut self) -> Result<(), LineError> {
        Ok(())
    }
}

/// Timing of the irregular on/off pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulsePolicy {
    /// Shortest high or low phase
    pub min_interval_ms: u64,
    /// Longest high or low phase
    pub max_interval_ms: u64,
    /// How long `stop` waits for the pulse task before moving on
    pub stop_timeout_ms: u64,
}

impl Default for PulsePolicy {
    fn default() -> Self {
        Self {
            min_interval_ms: 100,
            max_interval_ms: 500,
            stop_timeout_ms: 2_000,
        }
    }
}

impl PulsePolicy {
    /// Draw a phase duration uniformly from `[min, max]`.
    pub fn random_interval(&self) -> Duration {
        let (lo, hi) = if self.min_interval_ms <= self.max_interval_ms {
            (self.min_interval_ms, self.max_interval_ms)
        } else {
            (self.max_interval_ms, self.min_interval_ms)
        };
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}
