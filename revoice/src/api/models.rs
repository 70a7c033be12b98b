//! Request and response DTOs for the control surface.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::job::{Job, JobConfig, JobStatus};

/// Request body for starting a new dubbing job.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct StartJobRequest {
    /// URL of the source video.
    pub source_url: String,
    /// Job configuration; unspecified fields take their defaults.
    #[serde(default)]
    pub config: JobConfig,
}

/// Response for a started job.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StartJobResponse {
    pub job_id: String,
}

/// Query parameters for the job list.
#[derive(Debug, Clone, Deserialize, Default, IntoParams)]
pub struct ListJobsParams {
    /// Filter by job status.
    pub status: Option<JobStatus>,
    /// Number of items to return (default: 20, max: 100).
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Number of items to skip.
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

/// Response for the job list.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub has_more: bool,
}

/// Request body for retrying failed segments of a job.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RetryJobRequest {
    /// Failed segment indices to retry; defaults to every failed segment.
    #[serde(default)]
    pub segment_indices: Option<Vec<usize>>,
}

/// Response for a retried job.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RetryJobResponse {
    pub retried: Vec<usize>,
}

/// Health/status report.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_jobs: usize,
}
