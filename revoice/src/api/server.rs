//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::routes;
use crate::error::{Error, Result};
use crate::events::ProgressBus;
use crate::pipeline::orchestrator::JobOrchestrator;
use crate::store::JobStore;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8750,
            enable_cors: true,
        }
    }
}

impl ApiServerConfig {
    /// Load API server config from environment variables, falling back to
    /// defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `API_PORT` (e.g. "8750")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        config
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Job store
    pub store: Arc<dyn JobStore>,
    /// Progress event bus
    pub bus: Arc<ProgressBus>,
    /// Job orchestrator
    pub orchestrator: Arc<JobOrchestrator>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        bus: Arc<ProgressBus>,
        orchestrator: Arc<JobOrchestrator>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            store,
            bus,
            orchestrator,
        }
    }
}

/// Assemble the full application router.
pub fn build_router(state: AppState, config: &ApiServerConfig) -> Router {
    let jobs = routes::jobs::router().merge(routes::events::router());

    let mut router = Router::new()
        .nest("/api/jobs", jobs)
        .nest("/api", routes::health::router())
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

/// Bind and serve the API until the token fires.
pub async fn serve(
    state: AppState,
    config: ApiServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| Error::config(format!("invalid bind address: {e}")))?;

    let router = build_router(state, &config);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 8750);
        assert!(config.enable_cors);
    }
}
