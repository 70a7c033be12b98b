//! Service container: builds and owns the application's collaborators.
//!
//! All services are constructor-injected; nothing global. The container's
//! cancellation token is the root of every per-job token, so one cancel
//! tears the whole pipeline population down.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::AppState;
use crate::config::AppConfig;
use crate::downloader::HttpDownloader;
use crate::error::Result;
use crate::events::ProgressBus;
use crate::pipeline::media::{FfmpegMerger, FfmpegSplitter};
use crate::pipeline::orchestrator::{JobOrchestrator, OrchestratorConfig};
use crate::store::{InMemoryJobStore, JobStore};
use crate::workspace::WorkspaceManager;

/// Owns every long-lived service of the application.
pub struct ServiceContainer {
    pub config: AppConfig,
    pub store: Arc<dyn JobStore>,
    pub bus: Arc<ProgressBus>,
    pub workspace: Arc<WorkspaceManager>,
    pub orchestrator: Arc<JobOrchestrator>,
    cancellation: CancellationToken,
}

impl ServiceContainer {
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let cancellation = CancellationToken::new();

        tokio::fs::create_dir_all(&config.workspace_root).await?;
        let workspace = Arc::new(WorkspaceManager::new(
            config.workspace_root.clone(),
            cancellation.clone(),
        ));

        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let bus = Arc::new(ProgressBus::default());

        let client = reqwest::Client::builder()
            .user_agent(concat!("revoice/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| crate::Error::config(format!("failed to build HTTP client: {e}")))?;

        let provider = Arc::new(crate::provider::HttpDubbingProvider::new(
            client.clone(),
            config.provider_config()?,
        ));
        let downloader = Arc::new(HttpDownloader::new(client));

        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            bus.clone(),
            workspace.clone(),
            provider,
            Arc::new(FfmpegSplitter),
            Arc::new(FfmpegMerger),
            downloader,
            OrchestratorConfig {
                pool: config.pool.clone(),
                output_retention: config.output_retention,
                ..OrchestratorConfig::default()
            },
            cancellation.child_token(),
        ));

        info!(workspace = %config.workspace_root.display(), "Services initialized");
        Ok(Self {
            config,
            store,
            bus,
            workspace,
            orchestrator,
            cancellation,
        })
    }

    /// Root cancellation token; child tokens are handed to every job.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// State handed to the API layer.
    pub fn app_state(&self) -> AppState {
        AppState::new(self.store.clone(), self.bus.clone(), self.orchestrator.clone())
    }

    /// Graceful shutdown: cancel running jobs, then everything else.
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
        self.cancellation.cancel();
    }
}
