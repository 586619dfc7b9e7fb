//! Activity light for the HDD feedback agent.
//!
//! This module provides the pulsing indicator driver and platform-specific
//! ways of opening the hardware output line it drives.

pub mod driver;
pub mod types;

#[cfg(target_os = "linux")]
pub mod sysfs;

#[cfg(not(target_os = "linux"))]
pub mod noop;

// Re-export commonly used types
pub use driver::IndicatorDriver;
pub use types::{IndicatorState, Level, LineError, OutputLine, PulsePolicy};

#[cfg(target_os = "linux")]
pub use sysfs::{open_line, SysfsLine};

#[cfg(not(target_os = "linux"))]
pub use noop::open_line;
