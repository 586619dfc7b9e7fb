//! HDD Feedback Agent - fake hard-disk activity for emulated machines.
//!
//! This library turns passive filesystem writes (an emulator touching the
//! files of a mounted virtual disk, for instance) into the illusion of a
//! physical hard disk: a flickering activity light on a GPIO pin and a
//! seek/spin sound played through the system audio player.
//!
//! # Feedback Rules
//!
//! - **Short access**: an isolated change plays the short clip
//! - **Sustained access**: 3 or more changes within 3 seconds play the long clip
//! - **One cycle at a time**: changes arriving mid-cycle are dropped, never queued
//! - **Light covers sound**: the light starts before the clip and stops after it
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     HDD Feedback Agent                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Watcher   │──▶│ Coordinator │──▶│  Activity   │        │
//! │  │  (notify)   │   │(single-flt) │   │   Window    │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                       │        │                            │
//! │                       ▼        ▼                            │
//! │              ┌─────────────┐ ┌─────────────┐                │
//! │              │  Indicator  │ │  Playback   │                │
//! │              │   (GPIO)    │ │    Slot     │                │
//! │              └─────────────┘ └─────────────┘                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hdd_feedback_agent::{
//!     core::{ActivityEvent, ActivityPolicy},
//!     coordinator::{ActivityCoordinator, SoundSet},
//!     indicator::{IndicatorDriver, PulsePolicy},
//!     playback::{PlaybackPolicy, PlaybackSlot, SystemAudioBackend},
//! };
//!
//! # async fn run() {
//! // Falls back to a no-op light when GPIO is unavailable
//! let indicator = Arc::new(IndicatorDriver::open(17, PulsePolicy::default()));
//! let playback = Arc::new(PlaybackSlot::new(
//!     Arc::new(SystemAudioBackend::default()),
//!     PlaybackPolicy::default(),
//! ));
//! let coordinator = ActivityCoordinator::new(
//!     ActivityPolicy::default(),
//!     indicator,
//!     playback,
//!     SoundSet::new("sounds/hdd_short.wav", "sounds/hdd_long.wav"),
//! );
//!
//! coordinator.handle(ActivityEvent::now()).await;
//! coordinator.shutdown().await;
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod core;
pub mod indicator;
pub mod playback;
pub mod stats;
pub mod watcher;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use coordinator::{ActivityCoordinator, CycleReport, NotifyOutcome, SoundSet};
pub use crate::core::{ActivityClassification, ActivityEvent, ActivityPolicy, ActivityWindow};
pub use indicator::{IndicatorDriver, IndicatorState, Level, OutputLine, PulsePolicy};
pub use playback::{AudioBackend, PlaybackOutcome, PlaybackSlot, SystemAudioBackend};
pub use stats::{ActivityStats, SharedActivityStats};
pub use watcher::{FileWatchSource, WatchError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
