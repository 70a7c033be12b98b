//! Trait seams over the media-transport primitives.
//!
//! The orchestrator talks to the downloader, splitter and merger through
//! these traits; production wires in the ffmpeg/HTTP implementations while
//! tests substitute scripted fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use media_tools::merger::MergeProgress;
use media_tools::splitter::SplitProgress;
use media_tools::{MergeRequest, SegmentManifest, SplitRequest};
use tokio_util::sync::CancellationToken;

use crate::downloader::{DownloadError, HttpDownloader};

/// Byte-level progress callback: `(bytes_downloaded, bytes_total)`.
pub type ByteProgressCb = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;
/// Splitter progress callback.
pub type SplitProgressCb = Arc<dyn Fn(SplitProgress) + Send + Sync>;
/// Merger progress callback.
pub type MergeProgressCb = Arc<dyn Fn(MergeProgress) + Send + Sync>;

/// Source media download.
#[async_trait]
pub trait SourceDownloader: Send + Sync {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: ByteProgressCb,
        cancel: CancellationToken,
    ) -> Result<u64, DownloadError>;
}

/// Segment splitting.
#[async_trait]
pub trait Splitter: Send + Sync {
    async fn split(
        &self,
        request: SplitRequest,
        on_progress: SplitProgressCb,
        cancel: CancellationToken,
    ) -> media_tools::Result<SegmentManifest>;
}

/// Dubbed-audio merging.
#[async_trait]
pub trait Merger: Send + Sync {
    async fn merge(
        &self,
        request: MergeRequest,
        on_progress: MergeProgressCb,
        cancel: CancellationToken,
    ) -> media_tools::Result<PathBuf>;
}

#[async_trait]
impl SourceDownloader for HttpDownloader {
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: ByteProgressCb,
        cancel: CancellationToken,
    ) -> Result<u64, DownloadError> {
        HttpDownloader::download(self, url, dest, &*on_progress, &cancel).await
    }
}

/// FFmpeg-backed [`Splitter`].
#[derive(Default)]
pub struct FfmpegSplitter;

#[async_trait]
impl Splitter for FfmpegSplitter {
    async fn split(
        &self,
        request: SplitRequest,
        on_progress: SplitProgressCb,
        cancel: CancellationToken,
    ) -> media_tools::Result<SegmentManifest> {
        media_tools::split(&request, &*on_progress, &cancel).await
    }
}

/// FFmpeg-backed [`Merger`].
#[derive(Default)]
pub struct FfmpegMerger;

#[async_trait]
impl Merger for FfmpegMerger {
    async fn merge(
        &self,
        request: MergeRequest,
        on_progress: MergeProgressCb,
        cancel: CancellationToken,
    ) -> media_tools::Result<PathBuf> {
        media_tools::merge(&request, &*on_progress, &cancel).await
    }
}
