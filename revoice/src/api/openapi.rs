//! OpenAPI document for the control surface.

use utoipa::OpenApi;

/// Aggregated OpenAPI description of the API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "revoice API",
        description = "Automated video dubbing pipeline server"
    ),
    paths(
        crate::api::routes::jobs::start_job,
        crate::api::routes::jobs::list_jobs,
        crate::api::routes::jobs::get_job,
        crate::api::routes::jobs::cancel_job,
        crate::api::routes::jobs::retry_job,
        crate::api::routes::jobs::delete_job,
        crate::api::routes::events::job_events,
        crate::api::routes::health::health,
    ),
    components(schemas(
        crate::api::error::ApiErrorResponse,
        crate::api::models::StartJobRequest,
        crate::api::models::StartJobResponse,
        crate::api::models::ListJobsResponse,
        crate::api::models::RetryJobRequest,
        crate::api::models::RetryJobResponse,
        crate::api::models::HealthResponse,
        crate::job::Job,
        crate::job::JobConfig,
        crate::job::JobStatus,
        crate::job::JobProgress,
        crate::job::JobPaths,
        crate::job::Stage,
        crate::job::StageDetail,
        crate::job::DubbingProgress,
        crate::job::SegmentStatus,
        crate::job::SegmentState,
        crate::job::JobError,
        crate::job::ErrorCode,
        crate::job::JobLogEntry,
        crate::job::LogLevel,
        crate::job::VideoQuality,
        crate::job::OutputFormat,
        crate::job::SegmentStrategy,
        crate::events::JobEvent,
    )),
    tags(
        (name = "jobs", description = "Dubbing job lifecycle"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;
