//! External speech-dubbing provider abstraction.
//!
//! The trait hides the provider's transport; the error taxonomy is what the
//! worker pool's retry policy keys on. The client never retries internally.

mod http;

pub use http::{HttpDubbingProvider, ProviderConfig};

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport failure taxonomy exposed to the worker pool.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    /// Whether the worker pool may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }

    /// Classify an HTTP response status into the taxonomy.
    pub fn from_status(status: u16, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            401 | 403 => Self::Auth(body),
            429 => Self::RateLimited { retry_after },
            408 | 500..=599 => Self::Transient(format!("HTTP {status}: {body}")),
            _ => Self::Permanent(format!("HTTP {status}: {body}")),
        }
    }
}

/// Remote dubbing task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Status of one remote dubbing task.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteStatus {
    pub state: RemoteState,
    #[serde(default)]
    pub progress: Option<f32>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One segment submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Path of the segment media file to dub.
    pub input_path: PathBuf,
    /// Target language code.
    pub target_language: String,
    /// Whether the provider should watermark the output.
    pub watermark: bool,
}

/// Client for the external dubbing service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DubbingProvider: Send + Sync {
    /// Submit a segment for dubbing; returns the provider-assigned job id.
    async fn submit(&self, request: &SubmitRequest) -> Result<String, ProviderError>;

    /// Poll the state of a remote dubbing task.
    async fn status(&self, remote_job_id: &str) -> Result<RemoteStatus, ProviderError>;

    /// Fetch the dubbed audio bytes for a completed task.
    async fn download(
        &self,
        remote_job_id: &str,
        audio_url: Option<String>,
        language: &str,
    ) -> Result<Bytes, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(401, false)]
    #[case(403, false)]
    #[case(404, false)]
    #[case(408, true)]
    #[case(429, true)]
    #[case(500, true)]
    #[case(503, true)]
    #[case(422, false)]
    fn status_classification(#[case] status: u16, #[case] retryable: bool) {
        let err = ProviderError::from_status(status, None, String::new());
        assert_eq!(err.is_retryable(), retryable, "status {status}");
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = ProviderError::from_status(429, Some(Duration::from_secs(30)), String::new());
        match err {
            ProviderError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
