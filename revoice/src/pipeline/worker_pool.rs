//! Parallel dubbing worker pool.
//!
//! Fans segment work out to the dubbing provider under a bounded concurrency
//! cap, with per-segment retry and exponential backoff. Every segment is in
//! exactly one of pending/active/completed/failed at any instant; progress
//! snapshots are taken under the state lock so subscribers always observe
//! consistent counts.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::RngExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use media_tools::SegmentEntry;

use crate::job::{DubbingProgress, JobLogEntry, SegmentState, SegmentStatus, Stage};
use crate::provider::{DubbingProvider, ProviderError, RemoteState, SubmitRequest};

/// Snapshot callback, invoked under the pool's state lock after every
/// segment state transition. Must not block.
pub type PoolProgressCb = Arc<dyn Fn(DubbingProgress) + Send + Sync>;

/// Log callback for retry/failure notices. Must not block.
pub type PoolLogCb = Arc<dyn Fn(JobLogEntry) + Send + Sync>;

/// Worker-pool tuning.
#[derive(Debug, Clone)]
pub struct DubbingPoolConfig {
    /// Concurrent in-flight segments (1..=5).
    pub max_concurrent: usize,
    /// Total attempts per segment.
    pub max_retries: u32,
    /// Backoff before the second attempt.
    pub initial_backoff: Duration,
    /// Backoff growth factor per attempt.
    pub backoff_multiplier: f64,
    /// Interval between provider status polls (floor 1 s).
    pub poll_interval: Duration,
    /// Ceiling on waiting for one remote job; exceeding it fails the attempt.
    pub max_poll_time: Duration,
}

impl Default for DubbingPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_retries: 3,
            initial_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            poll_interval: Duration::from_secs(5),
            max_poll_time: Duration::from_secs(600),
        }
    }
}

impl DubbingPoolConfig {
    /// Backoff after a failed attempt number `attempt` (1-based):
    /// `initial * multiplier^(attempt - 1)`.
    pub fn backoff_after_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_backoff.mul_f64(factor.max(0.0))
    }

    fn effective_poll_interval(&self) -> Duration {
        self.poll_interval.max(Duration::from_secs(1))
    }

    fn effective_concurrency(&self) -> usize {
        self.max_concurrent.clamp(1, 5)
    }
}

/// Outcome for one segment after the pool finishes.
#[derive(Debug, Clone)]
pub struct SegmentResult {
    pub index: usize,
    pub output_path: Option<PathBuf>,
    pub remote_job_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

/// One segment under processing.
struct WorkItem {
    segment: SegmentEntry,
    state: SegmentState,
    attempt: u32,
    remote_job_id: Option<String>,
    last_error: Option<String>,
    output_path: Option<PathBuf>,
}

struct PoolState {
    pending: VecDeque<usize>,
    items: BTreeMap<usize, WorkItem>,
}

impl PoolState {
    fn snapshot(&self) -> DubbingProgress {
        let mut pending = 0;
        let mut active = 0;
        let mut completed = 0;
        let mut failed = 0;
        let segments = self
            .items
            .values()
            .map(|item| {
                match item.state {
                    SegmentState::Pending => pending += 1,
                    SegmentState::Uploading | SegmentState::Processing | SegmentState::Retrying => {
                        active += 1
                    }
                    SegmentState::Complete => completed += 1,
                    SegmentState::Failed => failed += 1,
                }
                SegmentStatus {
                    index: item.segment.index,
                    state: item.state,
                    attempt: item.attempt,
                    remote_job_id: item.remote_job_id.clone(),
                    error: item.last_error.clone(),
                }
            })
            .collect();
        DubbingProgress {
            total: self.items.len(),
            pending,
            active,
            completed,
            failed,
            segments,
        }
    }
}

struct PoolShared {
    state: Mutex<PoolState>,
    on_progress: PoolProgressCb,
    on_log: PoolLogCb,
}

impl PoolShared {
    /// Mutate one work item and emit a consistent snapshot, both under the
    /// state lock so observers never see torn counts.
    fn transition(&self, index: usize, apply: impl FnOnce(&mut WorkItem)) {
        let mut state = self.state.lock();
        if let Some(item) = state.items.get_mut(&index) {
            apply(item);
        }
        (self.on_progress)(state.snapshot());
    }

    fn log(&self, entry: JobLogEntry) {
        (self.on_log)(entry);
    }
}

/// Error of a single attempt, classified for the retry decision.
enum AttemptError {
    Provider(ProviderError),
    RemoteFailed(String),
    PollTimeout(Duration),
    Write(std::io::Error),
    Cancelled,
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::RemoteFailed(_) | Self::PollTimeout(_) | Self::Write(_) => true,
            Self::Cancelled => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after }) => *retry_after,
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Provider(e) => e.to_string(),
            Self::RemoteFailed(msg) => format!("Provider reported failure: {msg}"),
            Self::PollTimeout(limit) => {
                format!("Remote job did not finish within {}s", limit.as_secs())
            }
            Self::Write(e) => format!("Failed to write dubbed audio: {e}"),
            Self::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Bounded-concurrency segment processor.
pub struct DubbingWorkerPool {
    provider: Arc<dyn DubbingProvider>,
    config: DubbingPoolConfig,
}

impl DubbingWorkerPool {
    pub fn new(provider: Arc<dyn DubbingProvider>, config: DubbingPoolConfig) -> Self {
        Self { provider, config }
    }

    /// Process `segments` and return one result per segment, ordered by
    /// index. Cancellation stops dispatch; in-flight work winds down at its
    /// next suspension point and un-started segments are reported as
    /// `success = false, error = "cancelled"`.
    pub async fn run(
        &self,
        segments: Vec<SegmentEntry>,
        dubbed_dir: &Path,
        target_language: &str,
        watermark: bool,
        on_progress: PoolProgressCb,
        on_log: PoolLogCb,
        cancel: CancellationToken,
    ) -> Vec<SegmentResult> {
        let total = segments.len();
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                pending: segments.iter().map(|s| s.index).collect(),
                items: segments
                    .into_iter()
                    .map(|segment| {
                        (
                            segment.index,
                            WorkItem {
                                segment,
                                state: SegmentState::Pending,
                                attempt: 0,
                                remote_job_id: None,
                                last_error: None,
                                output_path: None,
                            },
                        )
                    })
                    .collect(),
            }),
            on_progress,
            on_log,
        });

        info!(
            total,
            max_concurrent = self.config.effective_concurrency(),
            target_language,
            "Starting dubbing worker pool"
        );

        // Initial all-pending snapshot.
        {
            let state = shared.state.lock();
            (shared.on_progress)(state.snapshot());
        }

        let max_concurrent = self.config.effective_concurrency();
        let mut join_set: JoinSet<()> = JoinSet::new();

        loop {
            // Dispatch from the head of the queue while capacity allows.
            // Cancellation stops dispatch; running tasks are left to finish.
            while join_set.len() < max_concurrent && !cancel.is_cancelled() {
                let next = shared.state.lock().pending.pop_front();
                let Some(index) = next else { break };
                join_set.spawn(Self::process_segment(
                    shared.clone(),
                    self.provider.clone(),
                    self.config.clone(),
                    dubbed_dir.to_path_buf(),
                    target_language.to_string(),
                    watermark,
                    index,
                    cancel.clone(),
                ));
            }

            match join_set.join_next().await {
                Some(Ok(())) => {}
                Some(Err(join_error)) => {
                    // A panicking segment task counts as a failed segment;
                    // its item is still in an active state, fix it up.
                    error!(error = %join_error, "Segment task panicked");
                }
                None => {
                    let pending_empty = shared.state.lock().pending.is_empty();
                    if pending_empty || cancel.is_cancelled() {
                        break;
                    }
                }
            }
        }

        // Anything never dispatched was cancelled.
        let leftover: Vec<usize> = {
            let mut state = shared.state.lock();
            state.pending.drain(..).collect()
        };
        for index in leftover {
            shared.transition(index, |item| {
                item.state = SegmentState::Failed;
                item.last_error = Some("cancelled".to_string());
            });
        }

        let state = shared.state.lock();
        state
            .items
            .values()
            .map(|item| SegmentResult {
                index: item.segment.index,
                output_path: item.output_path.clone(),
                remote_job_id: item.remote_job_id.clone(),
                success: item.state == SegmentState::Complete,
                error: item.last_error.clone(),
            })
            .collect()
    }

    /// Re-run only the nominated segments with attempt counts reset.
    ///
    /// This is the retry-job path: segments outside `indices` are untouched
    /// (their dubbed files remain on disk from the previous run).
    pub async fn retry_failed(
        &self,
        all_segments: &[SegmentEntry],
        indices: &[usize],
        dubbed_dir: &Path,
        target_language: &str,
        watermark: bool,
        on_progress: PoolProgressCb,
        on_log: PoolLogCb,
        cancel: CancellationToken,
    ) -> Vec<SegmentResult> {
        let subset: Vec<SegmentEntry> = all_segments
            .iter()
            .filter(|s| indices.contains(&s.index))
            .cloned()
            .collect();
        info!(retried = subset.len(), "Retrying failed segments");
        self.run(
            subset,
            dubbed_dir,
            target_language,
            watermark,
            on_progress,
            on_log,
            cancel,
        )
        .await
    }

    /// Drive one segment through its attempts until success, exhaustion or
    /// cancellation.
    #[allow(clippy::too_many_arguments)]
    async fn process_segment(
        shared: Arc<PoolShared>,
        provider: Arc<dyn DubbingProvider>,
        config: DubbingPoolConfig,
        dubbed_dir: PathBuf,
        target_language: String,
        watermark: bool,
        index: usize,
        cancel: CancellationToken,
    ) {
        let segment = {
            let state = shared.state.lock();
            match state.items.get(&index) {
                Some(item) => item.segment.clone(),
                None => return,
            }
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            shared.transition(index, |item| {
                item.state = SegmentState::Uploading;
                item.attempt = attempt;
            });

            let outcome = Self::attempt(
                &shared,
                provider.as_ref(),
                &config,
                &segment,
                &dubbed_dir,
                &target_language,
                watermark,
                index,
                &cancel,
            )
            .await;

            match outcome {
                Ok((remote_job_id, output_path)) => {
                    debug!(index, attempt, "Segment dubbed");
                    shared.transition(index, |item| {
                        item.state = SegmentState::Complete;
                        item.remote_job_id = Some(remote_job_id);
                        item.output_path = Some(output_path);
                        item.last_error = None;
                    });
                    return;
                }
                Err(err) => {
                    let message = err.message();
                    if cancel.is_cancelled() || matches!(err, AttemptError::Cancelled) {
                        shared.transition(index, |item| {
                            item.state = SegmentState::Failed;
                            item.last_error = Some("cancelled".to_string());
                        });
                        return;
                    }
                    if !err.is_retryable() || attempt >= config.max_retries {
                        error!(index, attempt, error = %message, "Segment failed permanently");
                        shared.log(JobLogEntry::error(
                            Stage::Dubbing,
                            format!("Segment {index} failed after {attempt} attempt(s): {message}"),
                        ));
                        shared.transition(index, |item| {
                            item.state = SegmentState::Failed;
                            item.last_error = Some(message);
                        });
                        return;
                    }

                    // Rate-limit hints can only lengthen the policy backoff.
                    let mut delay = config.backoff_after_attempt(attempt);
                    if let Some(retry_after) = err.retry_after() {
                        delay = delay.max(retry_after);
                    }
                    let delay = with_jitter(delay);

                    warn!(
                        index,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Segment attempt failed, retrying"
                    );
                    shared.log(JobLogEntry::warn(
                        Stage::Dubbing,
                        format!(
                            "Segment {index} attempt {attempt} failed ({message}), retrying in {:.1}s",
                            delay.as_secs_f64()
                        ),
                    ));
                    shared.transition(index, |item| {
                        item.state = SegmentState::Retrying;
                        item.last_error = Some(message.clone());
                    });

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            shared.transition(index, |item| {
                                item.state = SegmentState::Failed;
                                item.last_error = Some("cancelled".to_string());
                            });
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One attempt: submit, poll to completion, download and persist.
    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        shared: &Arc<PoolShared>,
        provider: &dyn DubbingProvider,
        config: &DubbingPoolConfig,
        segment: &SegmentEntry,
        dubbed_dir: &Path,
        target_language: &str,
        watermark: bool,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<(String, PathBuf), AttemptError> {
        let request = SubmitRequest {
            input_path: segment.path.clone(),
            target_language: target_language.to_string(),
            watermark,
        };
        let remote_job_id = provider
            .submit(&request)
            .await
            .map_err(AttemptError::Provider)?;

        shared.transition(index, |item| {
            item.state = SegmentState::Processing;
            item.remote_job_id = Some(remote_job_id.clone());
        });

        let deadline = Instant::now() + config.max_poll_time;
        let status = loop {
            let status = provider
                .status(&remote_job_id)
                .await
                .map_err(AttemptError::Provider)?;
            match status.state {
                RemoteState::Completed => break status,
                RemoteState::Failed => {
                    return Err(AttemptError::RemoteFailed(
                        status.error.unwrap_or_else(|| "unknown error".to_string()),
                    ));
                }
                RemoteState::Queued | RemoteState::Processing => {}
            }
            if Instant::now() >= deadline {
                return Err(AttemptError::PollTimeout(config.max_poll_time));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
                _ = tokio::time::sleep(config.effective_poll_interval()) => {}
            }
        };

        let bytes = provider
            .download(&remote_job_id, status.audio_url, target_language)
            .await
            .map_err(AttemptError::Provider)?;

        let output_path = dubbed_dir.join(format!("chunk_{index:03}_dubbed.mp3"));
        tokio::fs::write(&output_path, &bytes)
            .await
            .map_err(AttemptError::Write)?;

        Ok((remote_job_id, output_path))
    }
}

/// Spread retries out by up to ±10% to avoid thundering herds.
fn with_jitter(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.9..=1.1);
    delay.mul_f64(factor)
}
