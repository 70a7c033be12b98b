//! HTTP control surface: REST routes plus the SSE event stream.

pub mod error;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, serve, ApiServerConfig, AppState};
