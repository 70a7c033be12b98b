//! Environment-driven application configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::api::ApiServerConfig;
use crate::error::{Error, Result};
use crate::pipeline::worker_pool::DubbingPoolConfig;
use crate::provider::ProviderConfig;

/// Top-level application configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ApiServerConfig,
    /// Root directory of per-job workspaces.
    pub workspace_root: PathBuf,
    /// How long job outputs are kept after a terminal transition.
    pub output_retention: Duration,
    /// Dubbing service endpoint.
    pub provider_base_url: String,
    /// Dubbing service API key.
    pub provider_api_key: String,
    /// Per-request timeout against the dubbing service.
    pub provider_timeout: Duration,
    /// Worker-pool defaults (per-job concurrency comes from the job config).
    pub pool: DubbingPoolConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ApiServerConfig::default(),
            workspace_root: PathBuf::from("workspace"),
            output_retention: Duration::from_secs(24 * 60 * 60),
            provider_base_url: "https://api.dubbing.example.com/".to_string(),
            provider_api_key: String::new(),
            provider_timeout: Duration::from_secs(60),
            pool: DubbingPoolConfig::default(),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS`, `API_PORT`
    /// - `WORKSPACE_ROOT`
    /// - `OUTPUT_RETENTION_HOURS`
    /// - `DUBBING_API_URL`, `DUBBING_API_KEY`, `DUBBING_TIMEOUT_SECS`
    /// - `DUBBING_POLL_INTERVAL_SECS`, `DUBBING_MAX_POLL_SECS`
    /// - `DUBBING_MAX_RETRIES`, `DUBBING_INITIAL_BACKOFF_MS`
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();
        config.server = ApiServerConfig::from_env_or_default();

        if let Ok(root) = std::env::var("WORKSPACE_ROOT")
            && !root.trim().is_empty()
        {
            config.workspace_root = PathBuf::from(root);
        }
        if let Some(hours) = env_u64("OUTPUT_RETENTION_HOURS") {
            config.output_retention = Duration::from_secs(hours * 60 * 60);
        }
        if let Ok(url) = std::env::var("DUBBING_API_URL")
            && !url.trim().is_empty()
        {
            config.provider_base_url = url;
        }
        if let Ok(key) = std::env::var("DUBBING_API_KEY") {
            config.provider_api_key = key;
        }
        if let Some(secs) = env_u64("DUBBING_TIMEOUT_SECS") {
            config.provider_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("DUBBING_POLL_INTERVAL_SECS") {
            config.pool.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("DUBBING_MAX_POLL_SECS") {
            config.pool.max_poll_time = Duration::from_secs(secs);
        }
        if let Some(retries) = env_u64("DUBBING_MAX_RETRIES") {
            config.pool.max_retries = retries as u32;
        }
        if let Some(ms) = env_u64("DUBBING_INITIAL_BACKOFF_MS") {
            config.pool.initial_backoff = Duration::from_millis(ms);
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.provider_base_url)
            .map_err(|e| Error::config(format!("invalid DUBBING_API_URL: {e}")))?;
        if self.pool.poll_interval < Duration::from_secs(1) {
            return Err(Error::config(
                "DUBBING_POLL_INTERVAL_SECS must be at least 1 second",
            ));
        }
        Ok(())
    }

    /// Provider client settings derived from this config.
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let base_url = Url::parse(&self.provider_base_url)
            .map_err(|e| Error::config(format!("invalid DUBBING_API_URL: {e}")))?;
        Ok(ProviderConfig {
            base_url,
            api_key: self.provider_api_key.clone(),
            request_timeout: self.provider_timeout,
        })
    }
}
