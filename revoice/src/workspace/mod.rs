//! Per-job temp workspace: directory layout and scoped cleanup.
//!
//! Every job owns `<root>/<job_id>/{source,segments,dubbed,output}`. The
//! tree is deleted on terminal transition after a retention delay; deletion
//! failures are logged, never fatal.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::job::JobPaths;

/// Default retention of job outputs after a terminal transition.
pub const DEFAULT_OUTPUT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Creates and removes per-job directory trees under a common root.
pub struct WorkspaceManager {
    root: PathBuf,
    /// Stops pending cleanup timers on shutdown.
    shutdown: CancellationToken,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>, shutdown: CancellationToken) -> Self {
        Self {
            root: root.into(),
            shutdown,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Path of a job's workspace root.
    pub fn job_root(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    /// Create the full directory layout for a job.
    pub async fn create_job_dirs(&self, job_id: &str) -> Result<JobPaths> {
        let root = self.job_root(job_id);
        let paths = JobPaths {
            source: root.join("source"),
            segments: root.join("segments"),
            dubbed: root.join("dubbed"),
            output: root.join("output"),
            root,
        };
        for dir in [&paths.source, &paths.segments, &paths.dubbed, &paths.output] {
            tokio::fs::create_dir_all(dir).await?;
        }
        debug!(job_id, root = %paths.root.display(), "Created job workspace");
        Ok(paths)
    }

    /// Remove a job's workspace tree. Idempotent; failures are logged.
    pub async fn cleanup(&self, job_id: &str) {
        let root = self.job_root(job_id);
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => debug!(job_id, "Removed job workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(job_id, error = %e, "Failed to remove job workspace"),
        }
    }

    /// Schedule workspace removal after `delay`, typically the output
    /// retention window. Shutdown cancels the timer (never mid-delete).
    pub fn schedule_cleanup(self: &std::sync::Arc<Self>, job_id: &str, delay: Duration) {
        let manager = self.clone();
        let job_id = job_id.to_string();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(job_id, "Cleanup timer aborted by shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    manager.cleanup(&job_id).await;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn creates_full_layout() {
        let dir = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path(), CancellationToken::new());
        let paths = manager.create_job_dirs("job-1").await.unwrap();

        for sub in ["source", "segments", "dubbed", "output"] {
            assert!(dir.path().join("job-1").join(sub).is_dir());
        }
        assert_eq!(paths.root, dir.path().join("job-1"));
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path(), CancellationToken::new());
        manager.create_job_dirs("job-1").await.unwrap();

        manager.cleanup("job-1").await;
        assert!(!dir.path().join("job-1").exists());
        // Second call is a no-op.
        manager.cleanup("job-1").await;
    }

    #[tokio::test]
    async fn scheduled_cleanup_runs_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let manager = Arc::new(WorkspaceManager::new(dir.path(), CancellationToken::new()));
        manager.create_job_dirs("job-1").await.unwrap();

        manager.schedule_cleanup("job-1", Duration::from_millis(20));
        assert!(dir.path().join("job-1").exists());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dir.path().join("job-1").exists());
    }

    #[tokio::test]
    async fn shutdown_aborts_pending_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let shutdown = CancellationToken::new();
        let manager = Arc::new(WorkspaceManager::new(dir.path(), shutdown.clone()));
        manager.create_job_dirs("job-1").await.unwrap();

        manager.schedule_cleanup("job-1", Duration::from_millis(50));
        shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(dir.path().join("job-1").exists());
    }
}
