//! Video resolution probing
//!
//! Probing is optional. Every failure mode (binary missing, non-zero exit,
//! timeout, unparseable output) degrades to `None` so a scan never aborts
//! because of it.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can report a file's video resolution
#[async_trait]
pub trait MediaProber: Send + Sync {
    /// Resolution formatted as `"{width}x{height}"`, if it can be determined
    async fn probe(&self, path: &Path) -> Option<String>;
}

/// Prober backed by the `ffprobe` command-line tool
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: String,
}

impl FfprobeProber {
    pub fn new(ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Option<String> {
        let child = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height"])
            .args(["-of", "csv=p=0"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(PROBE_TIMEOUT, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(path = %path.display(), error = %e, "ffprobe could not be run");
                return None;
            }
            Err(_) => {
                debug!(path = %path.display(), "ffprobe timed out");
                return None;
            }
        };

        if !output.status.success() {
            debug!(
                path = %path.display(),
                exit_code = ?output.status.code(),
                "ffprobe exited with an error"
            );
            return None;
        }

        parse_resolution(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse ffprobe's `width,height` csv line into `WxH`
fn parse_resolution(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (width, height) = line.split_once(',')?;
    let width: u32 = width.trim().parse().ok()?;
    let height: u32 = height.trim().trim_end_matches(',').parse().ok()?;
    Some(format!("{}x{}", width, height))
}
