//! OpenAPI documentation and schema generation
//!
//! The specification is generated at compile time by utoipa from the route
//! annotations in [`crate::api::routes`].

use utoipa::OpenApi;

/// OpenAPI documentation for the backup-ingest control API
///
/// Served as JSON at `/openapi.json` and, when enabled, browsable at
/// `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "backup-ingest REST API",
        version = "0.1.0",
        description = "Submit backup archives for download, extraction and full-text indexing, then search them",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8420", description = "Local development server")
    ),
    paths(
        // Jobs
        crate::api::routes::create_job,
        crate::api::routes::list_jobs,
        crate::api::routes::get_job,
        crate::api::routes::retry_job,
        crate::api::routes::search_job,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::JobId,
        crate::types::Stage,
        crate::types::SearchHit,
        crate::types::Event,
        crate::job::JobInfo,
        crate::api::routes::CreateJobRequest,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "jobs", description = "Ingestion jobs - Submit archives, follow their progress, retry failures and search finished indexes"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
