//! Media probing via ffprobe.

use std::path::Path;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MediaToolError, Result};
use crate::process::{ensure_success, run_tool};

/// Resolve the ffprobe binary, honoring `FFPROBE_PATH`.
pub fn ffprobe_path() -> String {
    std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string())
}

/// Resolve the ffmpeg binary, honoring `FFMPEG_PATH`.
pub fn ffmpeg_path() -> String {
    std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string())
}

/// Probe the duration of a media file in seconds.
pub async fn probe_duration(input: &Path, cancel: &CancellationToken) -> Result<f64> {
    if !tokio::fs::try_exists(input).await.unwrap_or(false) {
        return Err(MediaToolError::InputNotReadable(input.to_path_buf()));
    }

    let mut cmd = Command::new(ffprobe_path());
    cmd.args([
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ])
    .arg(input)
    .env("LC_ALL", "C");

    let mut captured = String::new();
    let mut collect = |line: &str| {
        if captured.is_empty() {
            captured = line.trim().to_string();
        }
    };
    let output = run_tool("ffprobe", &mut cmd, Some(&mut collect), cancel).await?;
    ensure_success("ffprobe", &output)?;

    let duration = captured
        .parse::<f64>()
        .map_err(|_| MediaToolError::DurationParse(captured.clone()))?;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(MediaToolError::DurationParse(captured));
    }

    debug!(input = %input.display(), duration, "Probed media duration");
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_input_is_not_readable() {
        let err = probe_duration(Path::new("/nonexistent/video.mp4"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaToolError::InputNotReadable(_)));
    }
}
