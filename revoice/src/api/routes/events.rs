//! Job event stream route (Server-Sent Events).
//!
//! Streams the job's progress/log/error/complete events as named SSE
//! events with JSON payloads. The stream ends after the terminal event's
//! grace window, when the orchestrator closes the job's channel.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::events::EventStream;

/// Create the events router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/events", get(job_events))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}/events",
    tag = "jobs",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "SSE stream of job events", content_type = "text/event-stream"),
        (status = 404, description = "Job not found", body = crate::api::error::ApiErrorResponse)
    )
)]
pub async fn job_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribing to an unknown job would silently hang forever.
    state.store.get(&id).await.map_err(ApiError::from)?;

    debug!(job_id = %id, "Event stream subscriber attached");
    let stream = event_stream(state.bus.subscribe(&id));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn event_stream(events: EventStream) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let sse = Event::default()
            .event(event.name())
            .json_data(&event)
            .unwrap_or_else(|e| {
                debug!(error = %e, "Failed to encode event");
                Event::default().event("error").data("{}")
            });
        Some((Ok(sse), events))
    })
}
