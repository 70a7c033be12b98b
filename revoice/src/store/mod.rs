//! Job store: durable key -> job mapping with validated status transitions.
//!
//! Per-id operations are linearizable; cross-id ordering is undefined. The
//! default backend is in-memory (jobs are not required to survive a process
//! restart), behind a trait so a document store can be swapped in.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::job::{Job, JobError, JobLogEntry, JobProgress, JobStatus};

/// Filter and pagination for [`JobStore::list`].
#[derive(Debug, Clone, Default)]
pub struct JobListFilter {
    pub status: Option<JobStatus>,
    pub limit: usize,
    pub offset: usize,
}

/// Patch closure applied under the store's per-id serialization.
pub type JobPatch = Box<dyn FnOnce(&mut Job) + Send>;

/// Storage contract for jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with [`Error::DuplicateJob`] on id collision.
    async fn create(&self, job: Job) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Job>;

    /// Apply an arbitrary patch; last write wins, serialized per id.
    async fn update(&self, id: &str, patch: JobPatch) -> Result<Job>;

    /// Replace progress. Ignored once the job is terminal; the overall
    /// percent never decreases while the job is running.
    async fn update_progress(&self, id: &str, progress: JobProgress) -> Result<()>;

    /// Transition status, validating against the state machine. Entering a
    /// running state clears any previous terminal error; entering a terminal
    /// state stamps `completed_at`.
    async fn update_status(&self, id: &str, status: JobStatus, error: Option<JobError>)
        -> Result<()>;

    async fn set_output_file(&self, id: &str, output_file: String) -> Result<()>;

    async fn append_log(&self, id: &str, entry: JobLogEntry) -> Result<()>;

    /// List jobs ordered by `created_at` descending; returns `(jobs, has_more)`.
    async fn list(&self, filter: JobListFilter) -> Result<(Vec<Job>, bool)>;

    /// Delete a job record. Only allowed in terminal states.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory [`JobStore`] backend.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_job<T>(&self, id: &str, f: impl FnOnce(&mut Job) -> Result<T>) -> Result<T> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| Error::not_found("Job", id))?;
        let result = f(job)?;
        job.updated_at = Utc::now();
        Ok(result)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(Error::DuplicateJob(job.id));
        }
        debug!(job_id = %job.id, "Created job record");
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Job> {
        self.jobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("Job", id))
    }

    async fn update(&self, id: &str, patch: JobPatch) -> Result<Job> {
        self.with_job(id, |job| {
            patch(job);
            Ok(job.clone())
        })
    }

    async fn update_progress(&self, id: &str, mut progress: JobProgress) -> Result<()> {
        {
            // Late snapshots from a stage that lost a cancellation race must
            // not disturb the final record.
            let jobs = self.jobs.read();
            let job = jobs.get(id).ok_or_else(|| Error::not_found("Job", id))?;
            if job.status.is_terminal() {
                return Ok(());
            }
        }
        self.with_job(id, |job| {
            if job.status.is_terminal() {
                return Ok(());
            }
            if progress.overall_percent < job.progress.overall_percent {
                progress.overall_percent = job.progress.overall_percent;
            }
            job.progress = progress;
            Ok(())
        })
    }

    async fn update_status(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<JobError>,
    ) -> Result<()> {
        self.with_job(id, |job| {
            if !job.status.can_transition_to(status) {
                return Err(Error::invalid_transition(job.status, status));
            }
            debug!(job_id = %job.id, from = %job.status, to = %status, "Status transition");
            job.status = status;
            if status.is_terminal() {
                job.completed_at = Some(Utc::now());
                if let Some(error) = error {
                    job.error = Some(error);
                }
            } else {
                job.error = None;
            }
            Ok(())
        })
    }

    async fn set_output_file(&self, id: &str, output_file: String) -> Result<()> {
        self.with_job(id, |job| {
            job.output_file = Some(output_file);
            Ok(())
        })
    }

    async fn append_log(&self, id: &str, entry: JobLogEntry) -> Result<()> {
        self.with_job(id, |job| {
            job.logs.push(entry);
            Ok(())
        })
    }

    async fn list(&self, filter: JobListFilter) -> Result<(Vec<Job>, bool)> {
        let jobs = self.jobs.read();
        let mut matching: Vec<&Job> = jobs
            .values()
            .filter(|job| filter.status.is_none_or(|status| job.status == status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len();
        let limit = if filter.limit == 0 { total } else { filter.limit };
        let page: Vec<Job> = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .cloned()
            .collect();
        let has_more = filter.offset + page.len() < total;
        Ok((page, has_more))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut jobs = self.jobs.write();
        let job = jobs.get(id).ok_or_else(|| Error::not_found("Job", id))?;
        if !job.status.is_terminal() {
            return Err(Error::invalid_transition(job.status, "deleted"));
        }
        jobs.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobConfig, JobPaths, Stage, StageDetail};
    use std::path::PathBuf;

    fn paths() -> JobPaths {
        let root = PathBuf::from("/tmp/revoice/job");
        JobPaths {
            source: root.join("source"),
            segments: root.join("segments"),
            dubbed: root.join("dubbed"),
            output: root.join("output"),
            root,
        }
    }

    fn new_job() -> Job {
        Job::new(
            uuid::Uuid::new_v4().to_string(),
            "https://example.com/video.mp4",
            JobConfig::default(),
            paths(),
        )
    }

    #[tokio::test]
    async fn create_get_and_duplicate() {
        let store = InMemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job.clone()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().id, id);

        let err = store.create(job).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateJob(_)));
    }

    #[tokio::test]
    async fn status_transitions_are_validated() {
        let store = InMemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job).await.unwrap();

        store
            .update_status(&id, JobStatus::Downloading, None)
            .await
            .unwrap();
        let err = store
            .update_status(&id, JobStatus::Merging, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));

        store
            .update_status(&id, JobStatus::Cancelled, None)
            .await
            .unwrap();
        let job = store.get(&id).await.unwrap();
        assert!(job.completed_at.is_some());

        // cancel(cancel(job)) is rejected the second time.
        let err = store
            .update_status(&id, JobStatus::Cancelled, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));
    }

    #[tokio::test]
    async fn progress_percent_is_monotonic() {
        let store = InMemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job).await.unwrap();
        store
            .update_status(&id, JobStatus::Downloading, None)
            .await
            .unwrap();

        let mut progress = JobProgress::initial();
        progress.overall_percent = 42.0;
        store.update_progress(&id, progress.clone()).await.unwrap();

        progress.overall_percent = 10.0;
        progress.stage = Stage::Chunking;
        progress.stage_detail = StageDetail::Chunking { processed: 1, total: 3 };
        store.update_progress(&id, progress).await.unwrap();

        let job = store.get(&id).await.unwrap();
        assert_eq!(job.progress.overall_percent, 42.0);
        assert_eq!(job.progress.stage, Stage::Chunking);
    }

    #[tokio::test]
    async fn terminal_jobs_ignore_progress() {
        let store = InMemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job).await.unwrap();
        store
            .update_status(&id, JobStatus::Downloading, None)
            .await
            .unwrap();
        store
            .update_status(&id, JobStatus::Cancelled, None)
            .await
            .unwrap();

        let mut progress = JobProgress::initial();
        progress.overall_percent = 99.0;
        store.update_progress(&id, progress).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap().progress.overall_percent, 0.0);
    }

    #[tokio::test]
    async fn list_orders_and_paginates() {
        let store = InMemoryJobStore::new();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut job = new_job();
            job.created_at = Utc::now() + chrono::Duration::seconds(i);
            ids.push(job.id.clone());
            store.create(job).await.unwrap();
        }

        let (page, has_more) = store
            .list(JobListFilter { status: None, limit: 2, offset: 0 })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert!(has_more);
        // Newest first.
        assert_eq!(page[0].id, ids[4]);

        let (page, has_more) = store
            .list(JobListFilter { status: None, limit: 10, offset: 4 })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert!(!has_more);

        let (page, _) = store
            .list(JobListFilter { status: Some(JobStatus::Complete), limit: 10, offset: 0 })
            .await
            .unwrap();
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn delete_requires_terminal_state() {
        let store = InMemoryJobStore::new();
        let job = new_job();
        let id = job.id.clone();
        store.create(job).await.unwrap();

        let err = store.delete(&id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidStateTransition { .. }));

        store
            .update_status(&id, JobStatus::Downloading, None)
            .await
            .unwrap();
        store
            .update_status(&id, JobStatus::Failed, None)
            .await
            .unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.is_err());
    }
}
