//! Job orchestrator: drives the five-stage pipeline state machine.
//!
//! One supervised task per running job owns the stage sequence
//! Downloading -> Chunking -> Dubbing -> Merging -> Finalizing. Every stage
//! transition is persisted to the store before the stage body runs, and all
//! progress flows through the bus. The orchestrator holds the per-job
//! cancellation token; stage bodies observe it at every suspension point.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use media_tools::{MergeRequest, SegmentManifest, SplitRequest};

use crate::error::{Error, Result};
use crate::events::{JobEvent, ProgressBus, DEFAULT_GRACE_WINDOW};
use crate::job::{
    DubbingProgress, ErrorCode, Job, JobConfig, JobError, JobLogEntry, JobProgress, JobStatus,
    Stage, StageDetail,
};
use crate::pipeline::media::{
    ByteProgressCb, MergeProgressCb, Merger, SourceDownloader, SplitProgressCb, Splitter,
};
use crate::pipeline::progress::stage_span;
use crate::pipeline::worker_pool::{
    DubbingPoolConfig, DubbingWorkerPool, PoolLogCb, PoolProgressCb,
};
use crate::provider::DubbingProvider;
use crate::store::JobStore;
use crate::workspace::{WorkspaceManager, DEFAULT_OUTPUT_RETENTION};

/// File name of the downloaded source inside the job's source directory.
const SOURCE_FILENAME: &str = "video.mp4";

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Worker-pool defaults; `max_concurrent` is overridden per job.
    pub pool: DubbingPoolConfig,
    /// Workspace retention after a terminal transition.
    pub output_retention: Duration,
    /// Grace window during which terminal events stay subscribable.
    pub event_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pool: DubbingPoolConfig::default(),
            output_retention: DEFAULT_OUTPUT_RETENTION,
            event_grace: DEFAULT_GRACE_WINDOW,
        }
    }
}

/// What a spawned runner executes.
enum RunMode {
    /// The full five-stage pipeline.
    Full,
    /// Re-enter at Dubbing for the nominated failed segments.
    RetryDubbing(Vec<usize>),
}

/// A stage-attributed pipeline failure.
struct StageFailure {
    stage: Stage,
    error: Error,
}

/// Items flowing from sync stage callbacks to the async persistence pump.
enum StageFeed {
    Progress(JobProgress),
    Log(JobLogEntry),
}

/// The job lifecycle manager.
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    bus: Arc<ProgressBus>,
    workspace: Arc<WorkspaceManager>,
    provider: Arc<dyn DubbingProvider>,
    splitter: Arc<dyn Splitter>,
    merger: Arc<dyn Merger>,
    downloader: Arc<dyn SourceDownloader>,
    config: OrchestratorConfig,
    /// Cancellation token per running job.
    running: DashMap<String, CancellationToken>,
    shutdown: CancellationToken,
}

impl JobOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        bus: Arc<ProgressBus>,
        workspace: Arc<WorkspaceManager>,
        provider: Arc<dyn DubbingProvider>,
        splitter: Arc<dyn Splitter>,
        merger: Arc<dyn Merger>,
        downloader: Arc<dyn SourceDownloader>,
        config: OrchestratorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            bus,
            workspace,
            provider,
            splitter,
            merger,
            downloader,
            config,
            running: DashMap::new(),
            shutdown,
        }
    }

    /// Number of jobs with a live runner.
    pub fn active_jobs(&self) -> usize {
        self.running.len()
    }

    /// Validate inputs, create the job and its workspace, and launch the
    /// pipeline in the background.
    pub async fn start_job(
        self: &Arc<Self>,
        source_url: String,
        config: JobConfig,
    ) -> Result<Job> {
        config.validate()?;
        let url = Url::parse(&source_url)
            .map_err(|e| Error::validation(format!("invalid source url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::validation(format!(
                "unsupported source url scheme '{}'",
                url.scheme()
            )));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let paths = self.workspace.create_job_dirs(&job_id).await?;
        let job = Job::new(job_id.clone(), source_url, config, paths);
        self.store.create(job.clone()).await?;

        info!(job_id = %job.id, source = %job.source_url, lang = %job.config.target_language, "Job created");
        self.spawn_runner(job_id, RunMode::Full);
        Ok(job)
    }

    /// Cancel a running job. Sets the terminal status, publishes the
    /// `CANCELLED` error event and signals the runner's token; in-flight
    /// provider work is left to finish on its own.
    pub async fn cancel_job(self: &Arc<Self>, job_id: &str) -> Result<()> {
        let job = self.store.get(job_id).await?;
        if !job.status.can_transition_to(JobStatus::Cancelled) {
            return Err(Error::invalid_transition(job.status, JobStatus::Cancelled));
        }

        let job_error = JobError::cancelled(job.progress.stage);
        self.store
            .update_status(job_id, JobStatus::Cancelled, Some(job_error.clone()))
            .await?;
        if let Some((_, token)) = self.running.remove(job_id) {
            token.cancel();
        }

        warn!(job_id, "Job cancelled");
        let _ = self
            .store
            .append_log(job_id, JobLogEntry::warn(job.progress.stage, "Job cancelled"))
            .await;
        self.bus.publish(job_id, JobEvent::Error(job_error));
        self.finish_terminal(job_id).await;
        Ok(())
    }

    /// Retry the failed segments of a `Failed` job. Only supported when the
    /// segments workspace and manifest still exist; the pipeline re-enters
    /// at Dubbing and continues through Merging and Finalizing on success.
    pub async fn retry_job(
        self: &Arc<Self>,
        job_id: &str,
        segment_indices: Option<Vec<usize>>,
    ) -> Result<Vec<usize>> {
        let job = self.store.get(job_id).await?;
        if job.status != JobStatus::Failed {
            return Err(Error::invalid_transition(job.status, JobStatus::Dubbing));
        }

        // The only supported recovery path needs the split artifacts intact.
        let manifest = SegmentManifest::read_from(&job.paths.segments)
            .await
            .map_err(|e| {
                Error::validation(format!("cannot retry, segments workspace unavailable: {e}"))
            })?;

        let failed_set = job
            .error
            .as_ref()
            .and_then(|e| e.failed_segment_indices.clone())
            .unwrap_or_default();
        let indices = match segment_indices {
            Some(requested) => {
                if requested.is_empty() {
                    return Err(Error::validation("segment_indices must not be empty"));
                }
                if let Some(bad) = requested.iter().find(|i| !failed_set.contains(i)) {
                    return Err(Error::validation(format!(
                        "segment {bad} is not in the failed set {failed_set:?}"
                    )));
                }
                requested
            }
            None => failed_set,
        };
        if indices.is_empty() {
            return Err(Error::validation("job has no failed segments to retry"));
        }

        self.store
            .update_status(job_id, JobStatus::Dubbing, None)
            .await?;
        let _ = self
            .store
            .append_log(
                job_id,
                JobLogEntry::info(
                    Stage::Dubbing,
                    format!("Retrying {} failed segment(s): {indices:?}", indices.len()),
                ),
            )
            .await;

        info!(job_id, ?indices, "Retrying failed segments");
        self.spawn_runner(job_id.to_string(), RunMode::RetryDubbing(indices.clone()));
        Ok(indices)
    }

    /// Delete a terminal job: record, workspace and event channel.
    pub async fn delete_job(&self, job_id: &str) -> Result<()> {
        self.store.delete(job_id).await?;
        self.workspace.cleanup(job_id).await;
        self.bus.close_job(job_id);
        info!(job_id, "Job deleted");
        Ok(())
    }

    /// Cancel every running job and stop accepting new work.
    pub async fn shutdown(&self) {
        info!(active = self.running.len(), "Shutting down orchestrator");
        self.shutdown.cancel();
        self.running.clear();
    }

    fn spawn_runner(self: &Arc<Self>, job_id: String, mode: RunMode) {
        let token = self.shutdown.child_token();
        self.running.insert(job_id.clone(), token.clone());

        let this = self.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = this.drive(&job_id, &mode, &token).await;
            this.running.remove(&job_id);

            match outcome {
                Ok(output_file) => this.complete_job(&job_id, output_file, started).await,
                Err(failure) => {
                    if token.is_cancelled() || failure.error.is_cancelled() {
                        // cancel_job already wrote the terminal state and
                        // published the event; nothing further to do.
                        debug!(job_id, "Runner unwound after cancellation");
                    } else {
                        this.fail_job(&job_id, failure).await;
                    }
                }
            }
        });
    }

    /// Run the requested stages, returning the final output path.
    async fn drive(
        &self,
        job_id: &str,
        mode: &RunMode,
        token: &CancellationToken,
    ) -> std::result::Result<String, StageFailure> {
        match mode {
            RunMode::Full => {
                let job = self.stage_ctx(job_id, Stage::Downloading).await?;
                self.enter_stage(&job, Stage::Downloading).await?;
                let source = self.run_download(&job, token).await?;
                self.ensure_live(token, Stage::Downloading)?;

                let job = self.stage_ctx(job_id, Stage::Chunking).await?;
                self.enter_stage(&job, Stage::Chunking).await?;
                let manifest = self.run_chunking(&job, source, token).await?;
                self.ensure_live(token, Stage::Chunking)?;

                let job = self.stage_ctx(job_id, Stage::Dubbing).await?;
                self.enter_stage(&job, Stage::Dubbing).await?;
                self.run_dubbing(&job, &manifest, None, token).await?;
                self.ensure_live(token, Stage::Dubbing)?;

                let job = self.stage_ctx(job_id, Stage::Merging).await?;
                self.enter_stage(&job, Stage::Merging).await?;
                let output = self.run_merging(&job, &manifest, token).await?;
                self.ensure_live(token, Stage::Merging)?;
                Ok(output)
            }
            RunMode::RetryDubbing(indices) => {
                // Status is already Dubbing; the manifest was verified by
                // retry_job but may have been cleaned up since.
                let job = self.stage_ctx(job_id, Stage::Dubbing).await?;
                let manifest = SegmentManifest::read_from(&job.paths.segments)
                    .await
                    .map_err(|e| StageFailure {
                        stage: Stage::Dubbing,
                        error: e.into(),
                    })?;
                self.run_dubbing(&job, &manifest, Some(indices), token).await?;
                self.ensure_live(token, Stage::Dubbing)?;

                let job = self.stage_ctx(job_id, Stage::Merging).await?;
                self.enter_stage(&job, Stage::Merging).await?;
                let output = self.run_merging(&job, &manifest, token).await?;
                self.ensure_live(token, Stage::Merging)?;
                Ok(output)
            }
        }
    }

    async fn stage_ctx(&self, job_id: &str, stage: Stage) -> std::result::Result<Job, StageFailure> {
        self.store
            .get(job_id)
            .await
            .map_err(|error| StageFailure { stage, error })
    }

    fn ensure_live(
        &self,
        token: &CancellationToken,
        stage: Stage,
    ) -> std::result::Result<(), StageFailure> {
        if token.is_cancelled() {
            Err(StageFailure { stage, error: Error::Cancelled })
        } else {
            Ok(())
        }
    }

    /// Persist the stage transition and publish its opening progress before
    /// any stage work happens.
    async fn enter_stage(&self, job: &Job, stage: Stage) -> std::result::Result<(), StageFailure> {
        let status = status_for_stage(stage);
        self.store
            .update_status(&job.id, status, None)
            .await
            .map_err(|error| StageFailure { stage, error })?;

        let progress = JobProgress {
            stage,
            overall_percent: stage_span(stage).start,
            started_at: job.progress.started_at,
            stage_detail: opening_detail(stage),
        };
        self.persist_and_publish_progress(&job.id, progress).await;

        let entry = JobLogEntry::info(stage, format!("Entering stage {stage}"));
        let _ = self.store.append_log(&job.id, entry.clone()).await;
        self.bus.publish(&job.id, JobEvent::Log(entry));
        Ok(())
    }

    async fn run_download(
        &self,
        job: &Job,
        token: &CancellationToken,
    ) -> std::result::Result<std::path::PathBuf, StageFailure> {
        let stage = Stage::Downloading;
        let dest = job.paths.source.join(SOURCE_FILENAME);
        let (feed, pump) = self.spawn_feed_pump(&job.id);

        let span = stage_span(stage);
        let started_at = job.progress.started_at;
        let sender = feed.clone();
        let on_progress: ByteProgressCb = Arc::new(move |bytes_downloaded, bytes_total| {
            let overall = match bytes_total {
                Some(total) if total > 0 => span.map(bytes_downloaded as f64 / total as f64),
                // Unknown length: hold at the stage floor until completion.
                _ => span.start,
            };
            let _ = sender.send(StageFeed::Progress(JobProgress {
                stage,
                overall_percent: overall,
                started_at,
                stage_detail: StageDetail::Download { bytes_downloaded, bytes_total },
            }));
        });

        let result = self
            .downloader
            .download(&job.source_url, &dest, on_progress, token.clone())
            .await;
        drop(feed);
        let _ = pump.await;

        result.map_err(|e| StageFailure { stage, error: e.into() })?;
        Ok(dest)
    }

    async fn run_chunking(
        &self,
        job: &Job,
        source: std::path::PathBuf,
        token: &CancellationToken,
    ) -> std::result::Result<SegmentManifest, StageFailure> {
        let stage = Stage::Chunking;
        let (feed, pump) = self.spawn_feed_pump(&job.id);

        let span = stage_span(stage);
        let started_at = job.progress.started_at;
        let sender = feed.clone();
        let on_progress: SplitProgressCb = Arc::new(move |progress| {
            let fraction = progress.processed as f64 / progress.total.max(1) as f64;
            let _ = sender.send(StageFeed::Progress(JobProgress {
                stage,
                overall_percent: span.map(fraction),
                started_at,
                stage_detail: StageDetail::Chunking {
                    processed: progress.processed,
                    total: progress.total,
                },
            }));
        });

        let strategy = job.config.segment_strategy;
        if strategy != crate::job::SegmentStrategy::Fixed {
            let _ = feed.send(StageFeed::Log(JobLogEntry::warn(
                stage,
                format!("Segment strategy '{strategy:?}' is not implemented, using fixed-duration split"),
            )));
        }

        let request = SplitRequest {
            job_id: job.id.clone(),
            input: source,
            output_dir: job.paths.segments.clone(),
            segment_duration: job.config.segment_duration,
            strategy: strategy.as_split_strategy(),
        };
        let result = self
            .splitter
            .split(request, on_progress, token.clone())
            .await;

        if let Ok(manifest) = &result {
            let _ = feed.send(StageFeed::Log(JobLogEntry::info(
                stage,
                format!("Split source into {} segment(s)", manifest.total_count),
            )));
        }
        drop(feed);
        let _ = pump.await;

        result.map_err(|e| StageFailure { stage, error: e.into() })
    }

    async fn run_dubbing(
        &self,
        job: &Job,
        manifest: &SegmentManifest,
        retry_indices: Option<&[usize]>,
        token: &CancellationToken,
    ) -> std::result::Result<(), StageFailure> {
        let stage = Stage::Dubbing;
        let (feed, pump) = self.spawn_feed_pump(&job.id);

        let span = stage_span(stage);
        let started_at = job.progress.started_at;
        let sender = feed.clone();
        let on_progress: PoolProgressCb = Arc::new(move |snapshot: DubbingProgress| {
            let done = snapshot.completed + snapshot.failed;
            let fraction = done as f64 / snapshot.total.max(1) as f64;
            let _ = sender.send(StageFeed::Progress(JobProgress {
                stage,
                overall_percent: span.map(fraction),
                started_at,
                stage_detail: StageDetail::Dubbing(snapshot),
            }));
        });
        let sender = feed.clone();
        let on_log: PoolLogCb = Arc::new(move |entry| {
            let _ = sender.send(StageFeed::Log(entry));
        });

        let pool_config = DubbingPoolConfig {
            max_concurrent: job.config.max_parallel_jobs,
            ..self.config.pool.clone()
        };
        let pool = DubbingWorkerPool::new(self.provider.clone(), pool_config);

        let results = match retry_indices {
            None => {
                pool.run(
                    manifest.segments.clone(),
                    &job.paths.dubbed,
                    &job.config.target_language,
                    job.config.use_watermark,
                    on_progress,
                    on_log,
                    token.clone(),
                )
                .await
            }
            Some(indices) => {
                pool.retry_failed(
                    &manifest.segments,
                    indices,
                    &job.paths.dubbed,
                    &job.config.target_language,
                    job.config.use_watermark,
                    on_progress,
                    on_log,
                    token.clone(),
                )
                .await
            }
        };
        drop(feed);
        let _ = pump.await;

        if token.is_cancelled() {
            return Err(StageFailure { stage, error: Error::Cancelled });
        }

        let failed_indices: Vec<usize> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.index)
            .collect();
        if !failed_indices.is_empty() {
            return Err(StageFailure {
                stage,
                error: Error::DubbingFailed { failed_indices },
            });
        }
        Ok(())
    }

    async fn run_merging(
        &self,
        job: &Job,
        manifest: &SegmentManifest,
        token: &CancellationToken,
    ) -> std::result::Result<String, StageFailure> {
        let stage = Stage::Merging;
        let (feed, pump) = self.spawn_feed_pump(&job.id);

        let span = stage_span(stage);
        let started_at = job.progress.started_at;
        let sender = feed.clone();
        let on_progress: MergeProgressCb = Arc::new(move |progress| {
            let _ = sender.send(StageFeed::Progress(JobProgress {
                stage,
                overall_percent: span.map(f64::from(progress.percent) / 100.0),
                started_at,
                stage_detail: StageDetail::Merging {
                    step: progress.step.to_string(),
                    percent: progress.percent,
                },
            }));
        });

        let final_path = job
            .paths
            .output
            .join(format!("video_dubbed.{}", job.config.output_format.extension()));
        let request = MergeRequest {
            manifest: manifest.clone(),
            dubbed_dir: job.paths.dubbed.clone(),
            work_dir: job.paths.output.clone(),
            final_path: final_path.clone(),
        };
        let result = self.merger.merge(request, on_progress, token.clone()).await;
        drop(feed);
        let _ = pump.await;

        let path = result.map_err(|e| StageFailure { stage, error: e.into() })?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Finalize: record the output, flip to Complete at 100% and publish the
    /// terminal event.
    async fn complete_job(&self, job_id: &str, output_file: String, started: Instant) {
        let job = match self.store.get(job_id).await {
            Ok(job) => job,
            Err(e) => {
                error!(job_id, error = %e, "Job vanished before finalize");
                return;
            }
        };
        if let Err(e) = self.enter_stage(&job, Stage::Finalizing).await {
            // Lost a race against cancellation; the terminal state stands.
            debug!(job_id, error = %e.error, "Finalize skipped");
            return;
        }

        if let Err(e) = self.store.set_output_file(job_id, output_file.clone()).await {
            error!(job_id, error = %e, "Failed to record output file");
        }
        if let Err(e) = self
            .store
            .update_status(job_id, JobStatus::Complete, None)
            .await
        {
            debug!(job_id, error = %e, "Complete transition rejected");
            return;
        }

        let progress = JobProgress {
            stage: Stage::Finalizing,
            overall_percent: 100.0,
            started_at: job.progress.started_at,
            stage_detail: StageDetail::Finalizing,
        };
        // Terminal progress is written directly; update_progress would drop
        // it now that the job is Complete.
        let final_progress = progress.clone();
        let _ = self
            .store
            .update(
                job_id,
                Box::new(move |job| {
                    job.progress = final_progress;
                }),
            )
            .await;
        self.bus.publish(job_id, JobEvent::Progress(progress));

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let entry = JobLogEntry::info(
            Stage::Finalizing,
            format!("Job complete in {:.1}s: {output_file}", elapsed_ms as f64 / 1000.0),
        );
        let _ = self.store.append_log(job_id, entry.clone()).await;
        self.bus.publish(job_id, JobEvent::Log(entry));
        self.bus.publish(
            job_id,
            JobEvent::Complete { output_file, elapsed_ms },
        );

        if !job.config.keep_intermediate_files {
            for dir in [&job.paths.source, &job.paths.segments, &job.paths.dubbed] {
                if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!(job_id, dir = %dir.display(), error = %e, "Failed to remove intermediates");
                    }
                }
            }
        }
        self.finish_terminal(job_id).await;
        info!(job_id, elapsed_ms, "Pipeline complete");
    }

    async fn fail_job(&self, job_id: &str, failure: StageFailure) {
        let mut job_error = JobError::new(
            ErrorCode::for_stage(failure.stage),
            failure.stage,
            failure.error.to_string(),
        );
        if let Error::DubbingFailed { failed_indices } = &failure.error {
            job_error = job_error.with_failed_segments(failed_indices.clone());
            job_error.message = format!(
                "{} segment(s) failed dubbing after retries",
                failed_indices.len()
            );
        }

        error!(job_id, stage = %failure.stage, error = %failure.error, "Pipeline failed");
        if let Err(e) = self
            .store
            .update_status(job_id, JobStatus::Failed, Some(job_error.clone()))
            .await
        {
            // Already terminal (e.g. cancelled concurrently); keep that state.
            debug!(job_id, error = %e, "Failed transition rejected");
            return;
        }

        let entry = JobLogEntry::error(failure.stage, job_error.message.clone());
        let _ = self.store.append_log(job_id, entry.clone()).await;
        self.bus.publish(job_id, JobEvent::Log(entry));
        self.bus.publish(job_id, JobEvent::Error(job_error));
        self.finish_terminal(job_id).await;
    }

    /// Shared terminal bookkeeping: retention cleanup and channel close
    /// after the grace window.
    async fn finish_terminal(&self, job_id: &str) {
        self.workspace
            .schedule_cleanup(job_id, self.config.output_retention);
        self.bus.schedule_close(job_id, self.config.event_grace);
    }

    /// Bridge from synchronous stage callbacks to async persistence: a
    /// pump task serializes progress writes and log appends in arrival
    /// order, so subscribers observe a coherent event sequence.
    fn spawn_feed_pump(
        &self,
        job_id: &str,
    ) -> (mpsc::UnboundedSender<StageFeed>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = self.store.clone();
        let bus = self.bus.clone();
        let job_id = job_id.to_string();
        let handle = tokio::spawn(async move {
            while let Some(feed) = rx.recv().await {
                match feed {
                    StageFeed::Progress(progress) => {
                        persist_and_publish(&store, &bus, &job_id, progress).await;
                    }
                    StageFeed::Log(entry) => {
                        let _ = store.append_log(&job_id, entry.clone()).await;
                        bus.publish(&job_id, JobEvent::Log(entry));
                    }
                }
            }
        });
        (tx, handle)
    }

    async fn persist_and_publish_progress(&self, job_id: &str, progress: JobProgress) {
        persist_and_publish(&self.store, &self.bus, job_id, progress).await;
    }
}

/// Write progress to the store (which enforces percent monotonicity) and
/// publish the clamped result, so events never run backwards.
async fn persist_and_publish(
    store: &Arc<dyn JobStore>,
    bus: &ProgressBus,
    job_id: &str,
    progress: JobProgress,
) {
    if store.update_progress(job_id, progress).await.is_err() {
        return;
    }
    match store.get(job_id).await {
        Ok(job) if !job.status.is_terminal() => {
            bus.publish(job_id, JobEvent::Progress(job.progress));
        }
        _ => {}
    }
}

fn status_for_stage(stage: Stage) -> JobStatus {
    match stage {
        Stage::Downloading => JobStatus::Downloading,
        Stage::Chunking => JobStatus::Chunking,
        Stage::Dubbing => JobStatus::Dubbing,
        Stage::Merging => JobStatus::Merging,
        Stage::Finalizing => JobStatus::Finalizing,
    }
}

fn opening_detail(stage: Stage) -> StageDetail {
    match stage {
        Stage::Downloading => StageDetail::Download { bytes_downloaded: 0, bytes_total: None },
        Stage::Chunking => StageDetail::Chunking { processed: 0, total: 0 },
        Stage::Dubbing => StageDetail::Dubbing(DubbingProgress {
            total: 0,
            pending: 0,
            active: 0,
            completed: 0,
            failed: 0,
            segments: Vec::new(),
        }),
        Stage::Merging => StageDetail::Merging {
            step: media_tools::merger::STEP_REPLACING_AUDIO.to_string(),
            percent: 0,
        },
        Stage::Finalizing => StageDetail::Finalizing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_to_status_mapping_is_total() {
        for stage in [
            Stage::Downloading,
            Stage::Chunking,
            Stage::Dubbing,
            Stage::Merging,
            Stage::Finalizing,
        ] {
            let status = status_for_stage(stage);
            assert!(status.is_running());
        }
    }
}
