//! Sound playback for the HDD feedback agent.
//!
//! Clips are played by an external player process. The slot guarantees at
//! most one such process exists at a time.

pub mod backend;
pub mod slot;

// Re-export commonly used types
pub use backend::{parse_probe_output, AudioBackend, SystemAudioBackend};
pub use slot::{PlaybackOutcome, PlaybackPolicy, PlaybackSlot};
