//! Non-Linux stand-in for the GPIO line.
//!
//! This exists so the crate (and binary) builds on development machines
//! without a sysfs GPIO interface. Opening always fails, which makes the
//! indicator driver fall back to its disabled mode while audio keeps working.

use crate::indicator::types::{LineError, OutputLine};

/// No GPIO support here; the driver degrades to a no-op.
pub fn open_line(_pin: u32) -> Result<Box<dyn OutputLine>, LineError> {
    Err(LineError::Unsupported)
}
