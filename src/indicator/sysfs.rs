//! Linux implementation of the indicator line using the sysfs GPIO interface.
//!
//! The pin is exported under `/sys/class/gpio`, switched to output and
//! driven by writing `0`/`1` to its `value` attribute. The export is undone
//! on close if this process created it.

use crate::indicator::types::{Level, LineError, OutputLine};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// udev may need a moment to fix permissions on a freshly exported pin.
const EXPORT_SETTLE_ATTEMPTS: u32 = 10;
const EXPORT_SETTLE_DELAY: Duration = Duration::from_millis(20);

/// A GPIO output line backed by sysfs attribute files.
pub struct SysfsLine {
    root: PathBuf,
    pin: u32,
    value: File,
    exported_here: bool,
}

impl SysfsLine {
    /// Export and configure `pin` under `root` as an output.
    pub fn open_at(root: &Path, pin: u32) -> Result<Self, LineError> {
        let open_err = |reason: String| LineError::Open { pin, reason };
        let pin_dir = root.join(format!("gpio{pin}"));

        let mut exported_here = false;
        if !pin_dir.exists() {
            write_attr(&root.join("export"), pin.to_string().as_bytes())
                .map_err(|e| open_err(format!("export failed: {e}")))?;
            exported_here = true;
        }

        let direction = pin_dir.join("direction");
        let mut attempt = 0;
        loop {
            match write_attr(&direction, b"out") {
                Ok(()) => break,
                Err(e) if attempt + 1 < EXPORT_SETTLE_ATTEMPTS => {
                    tracing::debug!(pin, attempt, "gpio direction not writable yet: {e}");
                    attempt += 1;
                    thread::sleep(EXPORT_SETTLE_DELAY);
                }
                Err(e) => return Err(open_err(format!("set direction failed: {e}"))),
            }
        }

        let value = OpenOptions::new()
            .write(true)
            .open(pin_dir.join("value"))
            .map_err(|e| open_err(format!("open value failed: {e}")))?;

        tracing::info!(pin, exported_here, "gpio line opened");

        Ok(Self {
            root: root.to_path_buf(),
            pin,
            value,
            exported_here,
        })
    }
}

impl OutputLine for SysfsLine {
    fn write(&mut self, level: Level) -> Result<(), LineError> {
        self.value.seek(SeekFrom::Start(0)).map_err(LineError::Write)?;
        self.value
            .write_all(level.as_sysfs())
            .map_err(LineError::Write)?;
        self.value.flush().map_err(LineError::Write)
    }

    fn close(&mut self) -> Result<(), LineError> {
        if self.exported_here {
            write_attr(&self.root.join("unexport"), self.pin.to_string().as_bytes())
                .map_err(LineError::Write)?;
            self.exported_here = false;
        }
        Ok(())
    }
}

fn write_attr(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.write_all(contents)
}

/// Open `pin` through the system sysfs GPIO root.
pub fn open_line(pin: u32) -> Result<Box<dyn OutputLine>, LineError> {
    let line = SysfsLine::open_at(Path::new(SYSFS_GPIO_ROOT), pin)?;
    Ok(Box::new(line))
}
