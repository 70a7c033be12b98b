//! Range-aware HTTP file downloader with progress reporting.
//!
//! Streams the response body to disk, reporting byte progress (with total
//! when `Content-Length` is present) at a coarse granularity. No retry
//! policy lives here; the caller decides.

use std::path::Path;

use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Report progress roughly every this many bytes.
const PROGRESS_GRANULARITY: u64 = 256 * 1024;

/// Downloader failure taxonomy.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error status {0}")]
    HttpStatus(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Write error: {0}")]
    Write(#[from] std::io::Error),

    #[error("Download cancelled")]
    Cancelled,
}

/// Progress callback: `(bytes_downloaded, bytes_total)`.
pub type DownloadProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Streaming HTTP downloader.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `url` into `dest`, truncating any existing file.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        on_progress: DownloadProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        self.fetch(url, dest, None, on_progress, cancel).await
    }

    /// Resume a download from `offset` via a `Range` request, appending to
    /// `dest`. Falls back to a full download when the server ignores the
    /// range (responds 200 instead of 206).
    pub async fn resume(
        &self,
        url: &str,
        dest: &Path,
        offset: u64,
        on_progress: DownloadProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        self.fetch(url, dest, Some(offset), on_progress, cancel).await
    }

    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        offset: Option<u64>,
        on_progress: DownloadProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(offset) = offset {
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus(status.as_u16()));
        }

        // A 200 answer to a range request restarts the file from scratch.
        let resuming = offset.is_some() && status == reqwest::StatusCode::PARTIAL_CONTENT;
        let already_have = if resuming { offset.unwrap_or(0) } else { 0 };

        let bytes_total = response
            .content_length()
            .map(|len| len + already_have);
        debug!(url, total = ?bytes_total, resuming, "Starting download");

        let mut file = if resuming {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(dest)
                .await?
        } else {
            tokio::fs::File::create(dest).await?
        };

        let mut stream = response.bytes_stream();
        let mut bytes_downloaded = already_have;
        let mut last_reported = 0u64;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(DownloadError::Cancelled);
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| DownloadError::Network(e.to_string()))?;

            file.write_all(&chunk).await?;
            bytes_downloaded += chunk.len() as u64;

            if bytes_downloaded - last_reported >= PROGRESS_GRANULARITY {
                last_reported = bytes_downloaded;
                on_progress(bytes_downloaded, bytes_total);
            }
        }

        file.flush().await?;
        on_progress(bytes_downloaded, bytes_total.or(Some(bytes_downloaded)));

        info!(url, bytes = bytes_downloaded, dest = %dest.display(), "Download finished");
        Ok(bytes_downloaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bad_scheme_is_a_network_error() {
        let downloader = HttpDownloader::new(reqwest::Client::new());
        let dir = tempfile::tempdir().unwrap();
        let err = downloader
            .download(
                "notaurl://zzz",
                &dir.path().join("out.bin"),
                &|_, _| {},
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Network(_)));
    }
}
