//! Fixed-duration segment splitting.
//!
//! Splits the source video into contiguous, independently playable segments
//! using ffmpeg's segment muxer with stream copy (no re-encode). The commit
//! artifact is the [`SegmentManifest`] written atomically into the output
//! directory.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{MediaToolError, Result};
use crate::manifest::{SegmentEntry, SegmentManifest};
use crate::probe::{ffmpeg_path, probe_duration};
use crate::process::{ensure_success, parse_progress_out_time_ms, run_tool};

/// How the source is cut into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Fixed-duration cuts, stream copy.
    #[default]
    Fixed,
    /// Cut on scene changes. Currently falls back to fixed.
    Scene,
    /// Cut on silence. Currently falls back to fixed.
    Silence,
}

/// Progress of a running split.
#[derive(Debug, Clone)]
pub struct SplitProgress {
    /// Segments fully written so far.
    pub processed: usize,
    /// Expected total number of segments.
    pub total: usize,
    /// File name of the segment currently being written.
    pub current: Option<String>,
}

/// Progress callback for [`split`].
pub type SplitProgressFn<'a> = &'a (dyn Fn(SplitProgress) + Send + Sync);

/// Parameters for one split invocation.
#[derive(Debug, Clone)]
pub struct SplitRequest {
    pub job_id: String,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Target duration of each segment, seconds.
    pub segment_duration: u32,
    pub strategy: SplitStrategy,
}

/// Split `input` into fixed-duration segments and commit the manifest.
///
/// Segment timestamps are reset to zero so each file plays independently.
/// The last segment may be shorter than `segment_duration`.
pub async fn split(
    req: &SplitRequest,
    on_progress: SplitProgressFn<'_>,
    cancel: &CancellationToken,
) -> Result<SegmentManifest> {
    if req.strategy != SplitStrategy::Fixed {
        // Alternate strategies are declared but not implemented; a silent
        // fallback would misreport what actually happened.
        warn!(
            job_id = %req.job_id,
            strategy = ?req.strategy,
            "Segment strategy not implemented, falling back to fixed-duration split"
        );
    }

    let total_duration = probe_duration(&req.input, cancel).await?;
    let seg = f64::from(req.segment_duration.max(1));
    let expected_total = (total_duration / seg).ceil().max(1.0) as usize;

    let ext = req
        .input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_ascii_lowercase();
    let pattern = req.output_dir.join(format!("chunk_%03d.{ext}"));

    let mut cmd = Command::new(ffmpeg_path());
    cmd.arg("-y")
        .arg("-hide_banner")
        .arg("-nostats")
        .arg("-i")
        .arg(&req.input)
        .args(["-f", "segment"])
        .args(["-segment_time", &req.segment_duration.to_string()])
        .args(["-reset_timestamps", "1"])
        .args(["-map", "0"])
        .args(["-c", "copy"])
        .args(["-progress", "pipe:1"])
        .arg(&pattern)
        .env("LC_ALL", "C");

    let mut last_reported = 0usize;
    let mut report = |line: &str| {
        if let Some(out_ms) = parse_progress_out_time_ms(line) {
            let processed = ((out_ms as f64 / 1000.0) / seg).floor() as usize;
            let processed = processed.min(expected_total);
            if processed > last_reported {
                last_reported = processed;
                on_progress(SplitProgress {
                    processed,
                    total: expected_total,
                    current: Some(format!("chunk_{processed:03}.{ext}")),
                });
            }
        }
    };
    let output = run_tool("ffmpeg", &mut cmd, Some(&mut report), cancel).await?;
    ensure_success("ffmpeg", &output)?;

    let segments = collect_segments(&req.output_dir, &ext, seg, total_duration).await?;
    if segments.is_empty() {
        return Err(MediaToolError::ToolFailure {
            tool: "ffmpeg",
            exit_code: output.exit_code,
            stderr: format!("no segments produced in {}", req.output_dir.display()),
        });
    }

    on_progress(SplitProgress {
        processed: segments.len(),
        total: segments.len(),
        current: None,
    });

    let manifest = SegmentManifest::new(req.job_id.clone(), req.segment_duration, segments);
    manifest.write_atomic(&req.output_dir).await?;

    info!(
        job_id = %req.job_id,
        segments = manifest.total_count,
        duration = total_duration,
        "Split complete"
    );
    Ok(manifest)
}

/// Enumerate produced `chunk_NNN.<ext>` files in index order and derive
/// their time ranges from the requested segment duration.
async fn collect_segments(
    output_dir: &Path,
    ext: &str,
    seg: f64,
    total_duration: f64,
) -> Result<Vec<SegmentEntry>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("chunk_") && name.ends_with(&format!(".{ext}")) {
            names.push(name);
        }
    }
    names.sort();

    let count = names.len();
    Ok(names
        .into_iter()
        .enumerate()
        .map(|(index, filename)| {
            let start_time = index as f64 * seg;
            let end_time = if index + 1 == count {
                total_duration.max(start_time)
            } else {
                start_time + seg
            };
            SegmentEntry {
                index,
                path: output_dir.join(&filename),
                filename,
                start_time,
                end_time,
                duration: end_time - start_time,
            }
        })
        .collect())
}
