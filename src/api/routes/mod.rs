//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`jobs`] - Job creation, inspection, retry and search
//! - [`system`] - Health, events, OpenAPI

use crate::error::Error;
use crate::types::JobId;
use serde::{Deserialize, Serialize};

mod jobs;
mod system;

pub use jobs::*;
pub use system::*;

// ============================================================================
// Query/Request Types (shared across handlers)
// ============================================================================

/// Request body for POST /jobs
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct CreateJobRequest {
    /// HTTP(S) URL of the backup archive
    pub url: String,
}

/// Query parameters for GET /jobs/:id/search
#[derive(Debug, Default, Deserialize, Serialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Full-text query; blank returns no hits
    #[serde(default)]
    pub q: String,
}

/// Parse a path segment as a job id
///
/// A malformed id cannot name an existing job, so it is reported as not found.
fn parse_job_id(raw: &str) -> Result<JobId, Error> {
    raw.parse()
        .map_err(|_| Error::NotFound(format!("job {raw}")))
}
