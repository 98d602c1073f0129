//! # backup-ingest
//!
//! Turns large data-export archives into searchable full-text indexes.
//!
//! A submitted archive URL becomes a [`Job`](JobInfo) that moves through
//! `queued → downloading → extracting → indexing → completed`:
//!
//! - **Resumable transfer** - the archive is fetched in chunks with HTTP range
//!   requests; interrupted transfers continue from the last byte on disk
//! - **Safe extraction** - ZIP entries that would escape the target directory
//!   are rejected before anything is written
//! - **Full-text index** - documents (chat-export conversations or plain text
//!   files) go into a per-job SQLite FTS5 index
//! - **Crash recovery** - job state is persisted after every transition, and
//!   interrupted jobs are re-queued on the next startup
//!
//! ## Quick Start
//!
//! ```no_run
//! use backup_ingest::{Config, Event, JobManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = JobManager::new(Config::default()).await?;
//!     manager.startup().await?;
//!
//!     let mut events = manager.subscribe();
//!     let job = manager.create_job("https://example.com/export.zip").await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let Event::Completed { id, .. } = &event
//!             && *id == job.id
//!         {
//!             break;
//!         }
//!     }
//!
//!     for hit in manager.search(&job.id, "holiday plans").await? {
//!         println!("{}: {}", hit.title, hit.snippet);
//!     }
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Safe archive extraction
pub mod extraction;
/// Document discovery and full-text indexing
pub mod index;
/// Job record and stage bookkeeping
pub mod job;
/// Job orchestration (decomposed into focused submodules)
pub mod manager;
/// Retry logic with exponential backoff
pub mod retry;
/// Durable job store
pub mod store;
/// Resumable archive transfer
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    ApiError, ErrorDetail, Error, ExtractionError, IndexError, JobError, Result, StoreError,
    ToHttpStatus, TransferError,
};
pub use extraction::ArchiveExtractor;
pub use index::{IndexBuilder, SqliteIndex};
pub use job::JobInfo;
pub use manager::JobManager;
pub use store::JobStore;
pub use transfer::{DownloadTransfer, HttpFetcher, RangeFetcher};
pub use types::{Event, JobId, SearchHit, Stage};

/// Helper function to run the manager with graceful signal handling.
///
/// Waits for a termination signal and then calls the manager's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use backup_ingest::{Config, JobManager, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = JobManager::new(Config::default()).await?;
///     manager.startup().await?;
///
///     run_with_shutdown(&manager).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: &JobManager) -> Result<()> {
    wait_for_signal().await;
    manager.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
