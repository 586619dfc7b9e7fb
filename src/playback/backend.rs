//! Subprocess audio backends.
//!
//! Playback is delegated to the platform's command-line player so no audio
//! stack has to be linked in. Clip length comes from `ffprobe` when it is
//! installed.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Upper bound on how long a duration probe may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Something that can start a playback subprocess for a file.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Spawn a player for `path`. The caller owns the child and waits on it.
    fn spawn(&self, path: &Path) -> std::io::Result<Child>;

    /// Best-effort clip length. `None` means unknown.
    async fn probe_duration(&self, _path: &Path) -> Option<Duration> {
        None
    }
}

/// Plays through `afplay` (macOS), `paplay` (Linux) or PowerShell (Windows).
#[derive(Debug, Clone)]
pub struct SystemAudioBackend {
    /// Playback volume in `[0, 1]`; player default when unset
    volume: Option<f32>,
    /// Probe program, normally `ffprobe`
    probe_program: String,
}

impl SystemAudioBackend {
    pub fn new(volume: Option<f32>) -> Self {
        Self {
            volume: volume.map(|v| v.clamp(0.0, 1.0)),
            probe_program: "ffprobe".to_string(),
        }
    }

    /// Use a different probe executable.
    pub fn with_probe_program(mut self, program: impl Into<String>) -> Self {
        self.probe_program = program.into();
        self
    }

    /// Build the platform player command for `path`.
    pub fn play_command(&self, path: &Path) -> Command {
        let mut cmd = platform_command(path, self.volume);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for SystemAudioBackend {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(target_os = "macos")]
fn platform_command(path: &Path, volume: Option<f32>) -> Command {
    let mut cmd = Command::new("afplay");
    if let Some(v) = volume {
        cmd.arg("-v").arg(format!("{v:.2}"));
    }
    cmd.arg(path);
    cmd
}

#[cfg(target_os = "windows")]
fn platform_command(path: &Path, _volume: Option<f32>) -> Command {
    let script = format!(
        "(New-Object Media.SoundPlayer '{}').PlaySync()",
        path.display().to_string().replace('\'', "''")
    );
    let mut cmd = Command::new("powershell");
    cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
    cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn platform_command(path: &Path, volume: Option<f32>) -> Command {
    let mut cmd = Command::new("paplay");
    if let Some(v) = volume {
        cmd.arg(format!("--volume={}", paplay_volume(v)));
    }
    cmd.arg(path);
    cmd
}

/// paplay takes a linear volume where 65536 is 100%.
pub fn paplay_volume(volume: f32) -> u32 {
    (volume.clamp(0.0, 1.0) * 65536.0).round() as u32
}

#[async_trait]
impl AudioBackend for SystemAudioBackend {
    fn spawn(&self, path: &Path) -> std::io::Result<Child> {
        self.play_command(path).spawn()
    }

    async fn probe_duration(&self, path: &Path) -> Option<Duration> {
        let mut cmd = Command::new(&self.probe_program);
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "csv=p=0",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

        let output = match tokio::time::timeout(PROBE_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::debug!(program = %self.probe_program, "duration probe unavailable: {e}");
                return None;
            }
            Err(_) => {
                tracing::debug!(path = %path.display(), "duration probe timed out");
                return None;
            }
        };

        if !output.status.success() {
            tracing::debug!(path = %path.display(), status = %output.status, "duration probe failed");
            return None;
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the seconds value printed by `ffprobe`.
pub fn parse_probe_output(output: &str) -> Option<Duration> {
    let secs: f64 = output.lines().next()?.trim().parse().ok()?;
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}
