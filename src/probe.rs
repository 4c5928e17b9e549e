//! Media duration lookup, used for the intro/outro bookends.
//!
//! Probing shells out to `ffprobe`, the same way the scanner measures episodes.
//! Any failure is reported as "not available" and the bookend counts as zero.

use log::{debug, warn};
use std::path::Path;
use std::process::Command;

pub trait DurationProbe {
    /// Whole seconds, or `None` if the file is missing or cannot be probed.
    fn duration_seconds(&self, path: &Path) -> Option<u32>;
}

/// Probes files with `ffprobe` from `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfprobeProbe;

impl DurationProbe for FfprobeProbe {
    fn duration_seconds(&self, path: &Path) -> Option<u32> {
        if !path.exists() {
            debug!("No file at {}, duration 0", path.display());
            return None;
        }

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output();

        match output {
            Ok(output) if output.status.success() => {
                let duration = parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout));
                if duration.is_none() {
                    warn!("ffprobe returned no usable duration for {}", path.display());
                }
                duration
            }
            Ok(output) => {
                warn!(
                    "ffprobe failed for {}: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                warn!("Could not run ffprobe: {e}");
                None
            }
        }
    }
}

/// Never knows any duration. For setups without bookends or without ffprobe.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProbe;

impl DurationProbe for NoProbe {
    fn duration_seconds(&self, _path: &Path) -> Option<u32> {
        None
    }
}

/// Parse ffprobe's bare `format=duration` output, e.g. `"421.337000\n"`.
#[must_use]
pub fn parse_ffprobe_duration(stdout: &str) -> Option<u32> {
    let seconds: f64 = stdout.trim().parse().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 || seconds > f64::from(u32::MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(seconds as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ffprobe_duration() {
        assert_eq!(parse_ffprobe_duration("421.337000\n"), Some(421));
        assert_eq!(parse_ffprobe_duration("12"), Some(12));
        assert_eq!(parse_ffprobe_duration("N/A"), None);
        assert_eq!(parse_ffprobe_duration(""), None);
        assert_eq!(parse_ffprobe_duration("-3.0"), None);
    }

    #[test]
    fn test_missing_file_has_no_duration() {
        let probe = FfprobeProbe;
        assert_eq!(probe.duration_seconds(Path::new("/nonexistent/intro.mp4")), None);
        assert_eq!(NoProbe.duration_seconds(Path::new("/nonexistent/intro.mp4")), None);
    }
}
