//! Job data model: status state machine, progress, configuration and errors.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// Top-level phase of the pipeline.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Downloading,
    Chunking,
    Dubbing,
    Merging,
    Finalizing,
}

/// Job status.
///
/// Transitions are validated by [`JobStatus::can_transition_to`]:
///
/// ```text
/// Pending -> Downloading -> Chunking -> Dubbing -> Merging -> Finalizing -> Complete
/// any running state -> Failed | Cancelled
/// Failed -> Dubbing            (retry of failed segments only)
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Chunking,
    Dubbing,
    Merging,
    Finalizing,
    Complete,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// True while the pipeline may still make forward progress.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::Downloading
                | Self::Chunking
                | Self::Dubbing
                | Self::Merging
                | Self::Finalizing
        )
    }

    /// Terminal states. `Failed` is terminal-by-default but recoverable
    /// through the retry flow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows `self -> next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (*self, next) {
            (Pending, Downloading) => true,
            (Downloading, Chunking) => true,
            (Chunking, Dubbing) => true,
            (Dubbing, Merging) => true,
            (Merging, Finalizing) => true,
            (Finalizing, Complete) => true,
            (Failed, Dubbing) => true,
            (from, Failed) | (from, Cancelled) => from.is_running(),
            _ => false,
        }
    }
}

/// Log level for job execution logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
}

/// A single append-only log entry on a job.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

impl JobLogEntry {
    pub fn new(stage: Stage, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage,
            level,
            message: message.into(),
            metadata: None,
        }
    }

    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, LogLevel::Info, message)
    }

    pub fn warn(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, LogLevel::Warn, message)
    }

    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, LogLevel::Error, message)
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Machine-readable error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Validation,
    DownloadFailed,
    ChunkingFailed,
    DubbingFailed,
    MergingFailed,
    FinalizeFailed,
    Transient,
    RateLimited,
    Cancelled,
    InvalidState,
    NotFound,
    Internal,
}

impl ErrorCode {
    /// The stage-local terminal code for a failure in `stage`.
    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Downloading => Self::DownloadFailed,
            Stage::Chunking => Self::ChunkingFailed,
            Stage::Dubbing => Self::DubbingFailed,
            Stage::Merging => Self::MergingFailed,
            Stage::Finalizing => Self::FinalizeFailed,
        }
    }
}

/// Terminal error recorded on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
    pub stage: Stage,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_segment_indices: Option<Vec<usize>>,
}

impl JobError {
    pub fn new(code: ErrorCode, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage,
            // Only dubbing failures have a supported recovery path.
            recoverable: code == ErrorCode::DubbingFailed,
            details: None,
            failed_segment_indices: None,
        }
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self {
            code: ErrorCode::Cancelled,
            message: "Job was cancelled".to_string(),
            stage,
            recoverable: false,
            details: None,
            failed_segment_indices: None,
        }
    }

    pub fn with_failed_segments(mut self, indices: Vec<usize>) -> Self {
        self.failed_segment_indices = Some(indices);
        self
    }
}

/// Per-segment processing state inside the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SegmentState {
    Pending,
    Uploading,
    Processing,
    Retrying,
    Complete,
    Failed,
}

/// Point-in-time status of one segment, as carried in progress snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SegmentStatus {
    pub index: usize,
    pub state: SegmentState,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Consistent snapshot of worker-pool state.
///
/// Taken under the pool's state lock, so
/// `pending + active + completed + failed == total` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DubbingProgress {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub segments: Vec<SegmentStatus>,
}

/// Stage-specific progress payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageDetail {
    Download {
        bytes_downloaded: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes_total: Option<u64>,
    },
    Chunking {
        processed: usize,
        total: usize,
    },
    Dubbing(DubbingProgress),
    Merging {
        step: String,
        percent: u8,
    },
    Finalizing,
}

/// Overall job progress.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobProgress {
    pub stage: Stage,
    /// Overall pipeline percent in `[0, 100]`, non-decreasing while running.
    pub overall_percent: f32,
    pub started_at: DateTime<Utc>,
    pub stage_detail: StageDetail,
}

impl JobProgress {
    pub fn initial() -> Self {
        Self {
            stage: Stage::Downloading,
            overall_percent: 0.0,
            started_at: Utc::now(),
            stage_detail: StageDetail::Download {
                bytes_downloaded: 0,
                bytes_total: None,
            },
        }
    }
}

/// Per-job workspace directory layout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobPaths {
    #[schema(value_type = String)]
    pub root: PathBuf,
    #[schema(value_type = String)]
    pub source: PathBuf,
    #[schema(value_type = String)]
    pub segments: PathBuf,
    #[schema(value_type = String)]
    pub dubbed: PathBuf,
    #[schema(value_type = String)]
    pub output: PathBuf,
}

/// Requested video quality for the source download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    #[default]
    Best,
    High,
    Medium,
    Low,
}

/// Container format of the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mkv,
    Webm,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
        }
    }
}

/// How the source is cut into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStrategy {
    #[default]
    Fixed,
    Scene,
    Silence,
}

impl SegmentStrategy {
    pub fn as_split_strategy(&self) -> media_tools::SplitStrategy {
        match self {
            Self::Fixed => media_tools::SplitStrategy::Fixed,
            Self::Scene => media_tools::SplitStrategy::Scene,
            Self::Silence => media_tools::SplitStrategy::Silence,
        }
    }
}

/// Immutable per-job configuration, supplied at job creation.
///
/// Unknown fields are rejected at the control surface.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields, default)]
pub struct JobConfig {
    /// Segment duration in seconds (15..=600).
    pub segment_duration: u32,
    /// ISO-ish target language code (e.g. "es", "pt-BR").
    pub target_language: String,
    /// Worker-pool concurrency cap (1..=5).
    pub max_parallel_jobs: usize,
    pub video_quality: VideoQuality,
    pub output_format: OutputFormat,
    pub use_watermark: bool,
    pub keep_intermediate_files: bool,
    pub segment_strategy: SegmentStrategy,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            segment_duration: 60,
            target_language: "es".to_string(),
            max_parallel_jobs: 3,
            video_quality: VideoQuality::default(),
            output_format: OutputFormat::default(),
            use_watermark: false,
            keep_intermediate_files: false,
            segment_strategy: SegmentStrategy::default(),
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        if !(15..=600).contains(&self.segment_duration) {
            return Err(Error::validation(format!(
                "segment_duration must be between 15 and 600 seconds, got {}",
                self.segment_duration
            )));
        }
        if !(1..=5).contains(&self.max_parallel_jobs) {
            return Err(Error::validation(format!(
                "max_parallel_jobs must be between 1 and 5, got {}",
                self.max_parallel_jobs
            )));
        }
        let lang = self.target_language.trim();
        if lang.is_empty() || lang.len() > 16 {
            return Err(Error::validation("target_language must be a short language code"));
        }
        if !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::validation(format!(
                "target_language contains invalid characters: '{lang}'"
            )));
        }
        Ok(())
    }
}

/// The root job entity.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Job {
    pub id: String,
    pub source_url: String,
    pub config: JobConfig,
    pub status: JobStatus,
    pub progress: JobProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub logs: Vec<JobLogEntry>,
    pub paths: JobPaths,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        source_url: impl Into<String>,
        config: JobConfig,
        paths: JobPaths,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            source_url: source_url.into(),
            config,
            status: JobStatus::Pending,
            progress: JobProgress::initial(),
            output_file: None,
            error: None,
            logs: Vec::new(),
            paths,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(JobStatus::Pending, JobStatus::Downloading, true)]
    #[case(JobStatus::Downloading, JobStatus::Chunking, true)]
    #[case(JobStatus::Chunking, JobStatus::Dubbing, true)]
    #[case(JobStatus::Dubbing, JobStatus::Merging, true)]
    #[case(JobStatus::Merging, JobStatus::Finalizing, true)]
    #[case(JobStatus::Finalizing, JobStatus::Complete, true)]
    #[case(JobStatus::Failed, JobStatus::Dubbing, true)]
    #[case(JobStatus::Dubbing, JobStatus::Cancelled, true)]
    #[case(JobStatus::Pending, JobStatus::Dubbing, false)]
    #[case(JobStatus::Complete, JobStatus::Cancelled, false)]
    #[case(JobStatus::Cancelled, JobStatus::Downloading, false)]
    #[case(JobStatus::Failed, JobStatus::Merging, false)]
    #[case(JobStatus::Complete, JobStatus::Failed, false)]
    fn transition_rules(
        #[case] from: JobStatus,
        #[case] to: JobStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed, "{from} -> {to}");
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Dubbing.is_terminal());
    }

    #[test]
    fn config_defaults_are_valid() {
        JobConfig::default().validate().unwrap();
    }

    #[rstest]
    #[case(10, 3, "es")]
    #[case(601, 3, "es")]
    #[case(60, 0, "es")]
    #[case(60, 6, "es")]
    #[case(60, 3, "")]
    #[case(60, 3, "es_MX")]
    fn config_rejects_out_of_range(
        #[case] segment_duration: u32,
        #[case] max_parallel_jobs: usize,
        #[case] target_language: &str,
    ) {
        let config = JobConfig {
            segment_duration,
            max_parallel_jobs,
            target_language: target_language.to_string(),
            ..JobConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_config_fields_are_rejected() {
        let err = serde_json::from_str::<JobConfig>(r#"{"segment_duration": 60, "wat": 1}"#);
        assert!(err.is_err());
    }

    #[test]
    fn stage_error_codes() {
        assert_eq!(ErrorCode::for_stage(Stage::Downloading), ErrorCode::DownloadFailed);
        assert_eq!(ErrorCode::for_stage(Stage::Dubbing), ErrorCode::DubbingFailed);
        assert_eq!(ErrorCode::for_stage(Stage::Finalizing), ErrorCode::FinalizeFailed);
    }

    #[test]
    fn error_code_serializes_screaming() {
        let json = serde_json::to_string(&ErrorCode::DubbingFailed).unwrap();
        assert_eq!(json, r#""DUBBING_FAILED""#);
    }

    #[test]
    fn dubbing_error_is_recoverable() {
        let err = JobError::new(ErrorCode::DubbingFailed, Stage::Dubbing, "boom");
        assert!(err.recoverable);
        let err = JobError::new(ErrorCode::DownloadFailed, Stage::Downloading, "boom");
        assert!(!err.recoverable);
    }
}
