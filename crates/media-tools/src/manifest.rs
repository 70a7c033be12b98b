//! Segment manifest: the splitter's commit record.
//!
//! The manifest is the authoritative list of segments a job was split into.
//! It is committed atomically (tmp file + fsync + rename) so a concurrent
//! reader never observes a partial document.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MediaToolError, Result};

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

/// File name of the manifest inside the segments directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// A single time-contiguous slice of the source media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEntry {
    /// 0-based contiguous index.
    pub index: usize,
    /// File name inside the segments directory (`chunk_000.mp4`).
    pub filename: String,
    /// Start offset in the source, seconds.
    pub start_time: f64,
    /// End offset in the source, seconds.
    pub end_time: f64,
    /// Segment duration, seconds. The last segment may be shorter.
    pub duration: f64,
    /// Absolute on-disk path.
    pub path: PathBuf,
}

/// Manifest enumerating all segments of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentManifest {
    pub version: u32,
    pub job_id: String,
    pub total_count: usize,
    /// Requested fixed segment duration, seconds.
    pub segment_duration: u32,
    pub segments: Vec<SegmentEntry>,
}

impl SegmentManifest {
    pub fn new(job_id: impl Into<String>, segment_duration: u32, segments: Vec<SegmentEntry>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            job_id: job_id.into(),
            total_count: segments.len(),
            segment_duration,
            segments,
        }
    }

    /// Path of the manifest file for a given segments directory.
    pub fn path_in(segments_dir: &Path) -> PathBuf {
        segments_dir.join(MANIFEST_FILENAME)
    }

    /// Commit the manifest atomically into `segments_dir`.
    pub async fn write_atomic(&self, segments_dir: &Path) -> Result<PathBuf> {
        let final_path = Self::path_in(segments_dir);
        let tmp_path = segments_dir.join(format!("{MANIFEST_FILENAME}.tmp"));

        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| MediaToolError::ManifestWriteFailed(e.to_string()))?;

        let write = async {
            tokio::fs::write(&tmp_path, &json).await?;
            let file = tokio::fs::File::open(&tmp_path).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp_path, &final_path).await?;
            Ok::<_, std::io::Error>(())
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(MediaToolError::ManifestWriteFailed(e.to_string()));
        }

        debug!(path = %final_path.display(), segments = self.total_count, "Wrote segment manifest");
        Ok(final_path)
    }

    /// Read a previously committed manifest from `segments_dir`.
    pub async fn read_from(segments_dir: &Path) -> Result<Self> {
        let path = Self::path_in(segments_dir);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| MediaToolError::ManifestReadFailed(format!("{}: {e}", path.display())))?;
        let manifest: Self = serde_json::from_slice(&bytes)
            .map_err(|e| MediaToolError::ManifestReadFailed(e.to_string()))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(MediaToolError::ManifestReadFailed(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }
        Ok(manifest)
    }

    /// File stem a dubbed audio file derives from (`chunk_000` → `chunk_000_dubbed`).
    pub fn dubbed_filename(segment: &SegmentEntry) -> String {
        let stem = Path::new(&segment.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| segment.filename.clone());
        format!("{stem}_dubbed.mp3")
    }
}
