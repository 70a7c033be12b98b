//! Recombination of dubbed audio with the source segments.
//!
//! For every manifest segment the original audio track is replaced with the
//! dubbed audio file, then the per-segment results are concatenated in
//! manifest order into the final output file.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{MediaToolError, Result};
use crate::manifest::SegmentManifest;
use crate::probe::ffmpeg_path;
use crate::process::{ensure_success, run_tool};

/// Named merge step, as surfaced in progress events.
pub const STEP_REPLACING_AUDIO: &str = "replacing-audio";
pub const STEP_CONCATENATING: &str = "concatenating";
pub const STEP_FINALIZING: &str = "finalizing";

/// Progress of a running merge; `percent` is merge-local in `[0, 100]`.
#[derive(Debug, Clone)]
pub struct MergeProgress {
    pub step: &'static str,
    pub percent: u8,
}

/// Progress callback for [`merge`].
pub type MergeProgressFn<'a> = &'a (dyn Fn(MergeProgress) + Send + Sync);

/// Parameters for one merge invocation.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub manifest: SegmentManifest,
    /// Directory holding `chunk_NNN_dubbed.mp3` files.
    pub dubbed_dir: PathBuf,
    /// Scratch directory for per-segment intermediates.
    pub work_dir: PathBuf,
    /// Final output file path.
    pub final_path: PathBuf,
}

/// Merge dubbed audio into the source segments and concatenate the result.
pub async fn merge(
    req: &MergeRequest,
    on_progress: MergeProgressFn<'_>,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let total = req.manifest.segments.len();

    // All dubbed inputs must exist before any work starts.
    for segment in &req.manifest.segments {
        let expected = req.dubbed_dir.join(SegmentManifest::dubbed_filename(segment));
        if !tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            return Err(MediaToolError::MissingDubbedSegment {
                index: segment.index,
                expected,
            });
        }
    }

    let mut merged_paths = Vec::with_capacity(total);
    for (done, segment) in req.manifest.segments.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(MediaToolError::Cancelled);
        }

        let dubbed = req.dubbed_dir.join(SegmentManifest::dubbed_filename(segment));
        let merged = req.work_dir.join(format!("merged_{:03}.mp4", segment.index));

        let mut cmd = Command::new(ffmpeg_path());
        cmd.arg("-y")
            .arg("-hide_banner")
            .arg("-nostats")
            .arg("-i")
            .arg(&segment.path)
            .arg("-i")
            .arg(&dubbed)
            .args(["-map", "0:v:0"])
            .args(["-map", "1:a:0"])
            .args(["-c:v", "copy"])
            .args(["-c:a", "aac"])
            .arg("-shortest")
            .arg(&merged)
            .env("LC_ALL", "C");

        let output = run_tool("ffmpeg", &mut cmd, None, cancel).await?;
        ensure_success("ffmpeg", &output)?;
        merged_paths.push(merged);

        let percent = (((done + 1) * 85) / total.max(1)) as u8;
        on_progress(MergeProgress {
            step: STEP_REPLACING_AUDIO,
            percent,
        });
        debug!(index = segment.index, "Replaced audio track");
    }

    // Concat demuxer list; single quotes in paths are escaped per ffmpeg rules.
    let list_path = req.work_dir.join("concat.txt");
    let mut list = String::new();
    for path in &merged_paths {
        let escaped = path.to_string_lossy().replace('\'', r"'\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    tokio::fs::write(&list_path, list).await?;

    let ext = req
        .final_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    let combined = req.work_dir.join(format!("combined.{ext}"));

    let mut cmd = Command::new(ffmpeg_path());
    cmd.arg("-y")
        .arg("-hide_banner")
        .arg("-nostats")
        .args(["-f", "concat"])
        .args(["-safe", "0"])
        .arg("-i")
        .arg(&list_path)
        .args(["-c", "copy"])
        .args(["-movflags", "+faststart"])
        .arg(&combined)
        .env("LC_ALL", "C");

    let output = run_tool("ffmpeg", &mut cmd, None, cancel).await?;
    ensure_success("ffmpeg", &output)?;
    on_progress(MergeProgress {
        step: STEP_CONCATENATING,
        percent: 95,
    });

    // Rename into place; fall back to copy when crossing filesystems.
    if tokio::fs::rename(&combined, &req.final_path).await.is_err() {
        tokio::fs::copy(&combined, &req.final_path).await?;
        let _ = tokio::fs::remove_file(&combined).await;
    }
    on_progress(MergeProgress {
        step: STEP_FINALIZING,
        percent: 100,
    });

    info!(
        job_id = %req.manifest.job_id,
        output = %req.final_path.display(),
        segments = total,
        "Merge complete"
    );
    Ok(req.final_path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::SegmentEntry;

    fn manifest_with_segments(dir: &Path, count: usize) -> SegmentManifest {
        let segments = (0..count)
            .map(|i| SegmentEntry {
                index: i,
                filename: format!("chunk_{i:03}.mp4"),
                start_time: i as f64 * 60.0,
                end_time: (i as f64 + 1.0) * 60.0,
                duration: 60.0,
                path: dir.join(format!("chunk_{i:03}.mp4")),
            })
            .collect();
        SegmentManifest::new("job-1", 60, segments)
    }

    #[tokio::test]
    async fn missing_dubbed_file_is_reported_with_index() {
        let dir = tempfile::tempdir().unwrap();
        let dubbed_dir = dir.path().join("dubbed");
        tokio::fs::create_dir_all(&dubbed_dir).await.unwrap();
        // Only segment 0 has dubbed audio.
        tokio::fs::write(dubbed_dir.join("chunk_000_dubbed.mp3"), b"x")
            .await
            .unwrap();

        let req = MergeRequest {
            manifest: manifest_with_segments(dir.path(), 2),
            dubbed_dir,
            work_dir: dir.path().to_path_buf(),
            final_path: dir.path().join("final.mp4"),
        };
        let err = merge(&req, &|_| {}, &CancellationToken::new()).await.unwrap_err();
        match err {
            MediaToolError::MissingDubbedSegment { index, .. } => assert_eq!(index, 1),
            other => panic!("expected MissingDubbedSegment, got {other:?}"),
        }
    }
}
