//! Shared test doubles for pipeline scenario tests.
//!
//! The downloader, splitter, merger and dubbing provider are replaced with
//! scripted fakes so scenarios run without ffmpeg or network access. The
//! manifest, store, bus, workspace and orchestrator are the real thing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use media_tools::merger::{MergeProgress, STEP_CONCATENATING, STEP_FINALIZING, STEP_REPLACING_AUDIO};
use media_tools::splitter::SplitProgress;
use media_tools::{MergeRequest, SegmentEntry, SegmentManifest, SplitRequest};

use revoice::downloader::DownloadError;
use revoice::events::ProgressBus;
use revoice::job::{Job, JobConfig};
use revoice::pipeline::media::{
    ByteProgressCb, MergeProgressCb, Merger, SourceDownloader, SplitProgressCb, Splitter,
};
use revoice::pipeline::orchestrator::{JobOrchestrator, OrchestratorConfig};
use revoice::pipeline::worker_pool::DubbingPoolConfig;
use revoice::provider::{
    DubbingProvider, ProviderError, RemoteState, RemoteStatus, SubmitRequest,
};
use revoice::store::{InMemoryJobStore, JobStore};
use revoice::workspace::WorkspaceManager;

/// Scripted behavior of the fake provider for one segment.
#[derive(Debug, Clone, Copy)]
pub enum SegmentScript {
    /// Succeed on the first attempt.
    Ok,
    /// Fail transiently this many times, then succeed.
    FailTimes(usize),
    /// Fail transiently on every attempt.
    AlwaysFail,
    /// Sleep in submit, then succeed.
    Slow(Duration),
}

/// Fake dubbing provider driven by per-segment scripts.
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<usize, SegmentScript>>,
    attempts: Mutex<HashMap<usize, usize>>,
    submits: Mutex<HashMap<usize, usize>>,
}

impl ScriptedProvider {
    pub fn new(scripts: &[(usize, SegmentScript)]) -> Self {
        Self {
            scripts: Mutex::new(scripts.iter().copied().collect()),
            attempts: Mutex::new(HashMap::new()),
            submits: Mutex::new(HashMap::new()),
        }
    }

    /// Change a segment's script (e.g. heal it before a retry).
    pub fn set_script(&self, index: usize, script: SegmentScript) {
        self.scripts.lock().insert(index, script);
        self.attempts.lock().remove(&index);
    }

    pub fn submit_count(&self, index: usize) -> usize {
        self.submits.lock().get(&index).copied().unwrap_or(0)
    }

    pub fn total_submits(&self) -> usize {
        self.submits.lock().values().sum()
    }

    fn index_of(request: &SubmitRequest) -> usize {
        // chunk_NNN.mp4 -> NNN
        let name = request.input_path.file_stem().unwrap().to_string_lossy();
        name.trim_start_matches("chunk_").parse().unwrap()
    }
}

#[async_trait]
impl DubbingProvider for ScriptedProvider {
    async fn submit(&self, request: &SubmitRequest) -> Result<String, ProviderError> {
        let index = Self::index_of(request);
        *self.submits.lock().entry(index).or_insert(0) += 1;
        let attempt = {
            let mut attempts = self.attempts.lock();
            let entry = attempts.entry(index).or_insert(0);
            *entry += 1;
            *entry
        };

        let script = self
            .scripts
            .lock()
            .get(&index)
            .copied()
            .unwrap_or(SegmentScript::Ok);
        match script {
            SegmentScript::Ok => {}
            SegmentScript::FailTimes(budget) if attempt <= budget => {
                return Err(ProviderError::Transient(format!(
                    "scripted transient failure {attempt} for segment {index}"
                )));
            }
            SegmentScript::FailTimes(_) => {}
            SegmentScript::AlwaysFail => {
                return Err(ProviderError::Transient(format!(
                    "scripted persistent failure for segment {index}"
                )));
            }
            SegmentScript::Slow(delay) => tokio::time::sleep(delay).await,
        }
        Ok(format!("remote-{index}-{attempt}"))
    }

    async fn status(&self, _remote_job_id: &str) -> Result<RemoteStatus, ProviderError> {
        Ok(RemoteStatus {
            state: RemoteState::Completed,
            progress: Some(100.0),
            audio_url: None,
            error: None,
        })
    }

    async fn download(
        &self,
        _remote_job_id: &str,
        _audio_url: Option<String>,
        _language: &str,
    ) -> Result<Bytes, ProviderError> {
        Ok(Bytes::from_static(b"dubbed-audio"))
    }
}

/// Fake source downloader that writes a small file and reports byte progress.
pub struct FakeDownloader {
    pub bytes: u64,
}

#[async_trait]
impl SourceDownloader for FakeDownloader {
    async fn download(
        &self,
        _url: &str,
        dest: &Path,
        on_progress: ByteProgressCb,
        _cancel: CancellationToken,
    ) -> Result<u64, DownloadError> {
        tokio::fs::write(dest, vec![0u8; self.bytes as usize]).await?;
        on_progress(self.bytes / 2, Some(self.bytes));
        on_progress(self.bytes, Some(self.bytes));
        Ok(self.bytes)
    }
}

/// Fake splitter that fabricates fixed-duration segments for a source of a
/// configured duration and commits a real manifest.
pub struct FakeSplitter {
    pub source_duration: f64,
    pub calls: AtomicUsize,
}

impl FakeSplitter {
    pub fn new(source_duration: f64) -> Self {
        Self {
            source_duration,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Splitter for FakeSplitter {
    async fn split(
        &self,
        request: SplitRequest,
        on_progress: SplitProgressCb,
        _cancel: CancellationToken,
    ) -> media_tools::Result<SegmentManifest> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seg = f64::from(request.segment_duration);
        let total = (self.source_duration / seg).ceil().max(1.0) as usize;

        let mut segments = Vec::with_capacity(total);
        for index in 0..total {
            let filename = format!("chunk_{index:03}.mp4");
            let path = request.output_dir.join(&filename);
            tokio::fs::write(&path, b"segment-video").await?;
            let start_time = index as f64 * seg;
            let end_time = if index + 1 == total {
                self.source_duration
            } else {
                start_time + seg
            };
            segments.push(SegmentEntry {
                index,
                filename,
                start_time,
                end_time,
                duration: end_time - start_time,
                path,
            });
            on_progress(SplitProgress {
                processed: index + 1,
                total,
                current: None,
            });
        }

        let manifest = SegmentManifest::new(request.job_id, request.segment_duration, segments);
        manifest.write_atomic(&request.output_dir).await?;
        Ok(manifest)
    }
}

/// Fake merger that requires every dubbed file and writes the final output.
#[derive(Default)]
pub struct FakeMerger;

#[async_trait]
impl Merger for FakeMerger {
    async fn merge(
        &self,
        request: MergeRequest,
        on_progress: MergeProgressCb,
        _cancel: CancellationToken,
    ) -> media_tools::Result<PathBuf> {
        for segment in &request.manifest.segments {
            let expected = request
                .dubbed_dir
                .join(SegmentManifest::dubbed_filename(segment));
            if !expected.exists() {
                return Err(media_tools::MediaToolError::MissingDubbedSegment {
                    index: segment.index,
                    expected,
                });
            }
        }
        on_progress(MergeProgress { step: STEP_REPLACING_AUDIO, percent: 85 });
        on_progress(MergeProgress { step: STEP_CONCATENATING, percent: 95 });
        tokio::fs::write(&request.final_path, b"final-dubbed-video").await?;
        on_progress(MergeProgress { step: STEP_FINALIZING, percent: 100 });
        Ok(request.final_path)
    }
}

/// Fully wired orchestrator over scripted collaborators.
pub struct Harness {
    /// Workspace root; held so the tree outlives the scenario.
    pub _dir: TempDir,
    pub store: Arc<dyn JobStore>,
    pub bus: Arc<ProgressBus>,
    pub provider: Arc<ScriptedProvider>,
    pub splitter: Arc<FakeSplitter>,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl Harness {
    pub fn new(provider: ScriptedProvider, source_duration: f64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = CancellationToken::new();

        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let bus = Arc::new(ProgressBus::default());
        let workspace = Arc::new(WorkspaceManager::new(dir.path(), shutdown.clone()));
        let provider = Arc::new(provider);
        let splitter = Arc::new(FakeSplitter::new(source_duration));

        let config = OrchestratorConfig {
            pool: DubbingPoolConfig {
                max_concurrent: 3,
                max_retries: 3,
                initial_backoff: Duration::from_millis(10),
                backoff_multiplier: 2.0,
                poll_interval: Duration::from_secs(1),
                max_poll_time: Duration::from_secs(5),
            },
            output_retention: Duration::from_secs(3600),
            event_grace: Duration::from_millis(500),
        };

        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            bus.clone(),
            workspace,
            provider.clone(),
            splitter.clone(),
            Arc::new(FakeMerger),
            Arc::new(FakeDownloader { bytes: 4096 }),
            config,
            shutdown,
        ));

        Self {
            _dir: dir,
            store,
            bus,
            provider,
            splitter,
            orchestrator,
        }
    }
}

/// Job config used across scenarios; intermediates are kept so tests can
/// inspect the dubbed directory.
pub fn test_config() -> JobConfig {
    JobConfig {
        segment_duration: 60,
        target_language: "es".to_string(),
        max_parallel_jobs: 3,
        keep_intermediate_files: true,
        ..JobConfig::default()
    }
}

/// Poll the store until the job reaches a terminal status.
pub async fn wait_for_terminal(store: &Arc<dyn JobStore>, job_id: &str) -> Job {
    wait_for(store, job_id, |job| job.status.is_terminal()).await
}

/// Poll the store until `predicate` holds, panicking after 10 seconds.
pub async fn wait_for(
    store: &Arc<dyn JobStore>,
    job_id: &str,
    predicate: impl Fn(&Job) -> bool,
) -> Job {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = store.get(job_id).await.unwrap();
        if predicate(&job) {
            return job;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "timed out waiting for job {job_id}; status={}, error={:?}",
                job.status, job.error
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Count dubbed audio files in a job's dubbed directory.
pub async fn dubbed_file_count(job: &Job) -> usize {
    let mut count = 0;
    let mut entries = tokio::fs::read_dir(&job.paths.dubbed).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with("_dubbed.mp3") {
            count += 1;
        }
    }
    count
}
