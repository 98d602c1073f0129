//! Application state for the API server

use crate::{Config, JobManager};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; both fields are cheap `Arc` clones.
#[derive(Clone)]
pub struct AppState {
    /// The job manager serving every request
    pub manager: Arc<JobManager>,

    /// Configuration the router was built with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(manager: Arc<JobManager>, config: Arc<Config>) -> Self {
        Self { manager, config }
    }
}
