//! Job orchestration
//!
//! The `JobManager` struct and its methods are organized by domain:
//! - [`jobs`] - Job submission, queries, search and retry
//! - [`pipeline`] - Per-job worker and the stage handlers
//! - [`progress`] - Coalescing of stage progress into job updates
//! - [`lifecycle`] - Startup recovery and graceful shutdown

mod jobs;
mod lifecycle;
mod pipeline;
mod progress;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Error, Result, StoreError};
use crate::extraction::ArchiveExtractor;
use crate::index::{IndexBuilder, SqliteIndex};
use crate::job::Job;
use crate::store::{JobRecords, JobStore};
use crate::transfer::{DownloadTransfer, HttpFetcher, RangeFetcher};
use crate::types::{Event, JobId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

/// Capacity of the event channel; slower subscribers see `RecvError::Lagged`
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Worker bookkeeping
#[derive(Clone)]
pub(crate) struct WorkerState {
    /// Limits how many jobs run at once (`download.max_concurrent_jobs`)
    pub(crate) capacity: Arc<Semaphore>,
    /// Jobs with a live worker, and the token that stops it
    pub(crate) active: Arc<std::sync::Mutex<HashMap<JobId, CancellationToken>>>,
    /// Set by `startup`, cleared by `shutdown`
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Set once `startup` has run
    pub(crate) started: Arc<tokio::sync::Mutex<bool>>,
}

/// The stage components a worker drives
#[derive(Clone)]
pub(crate) struct Components {
    pub(crate) transfer: DownloadTransfer,
    pub(crate) extractor: ArchiveExtractor,
    pub(crate) indexer: Arc<dyn IndexBuilder>,
}

/// Owns every job and runs them through download, extraction and indexing
///
/// Cheap to clone; all state is shared. Call [`JobManager::startup`] before
/// submitting work and [`JobManager::shutdown`] before exiting.
#[derive(Clone)]
pub struct JobManager {
    pub(crate) config: Arc<Config>,
    pub(crate) store: Arc<JobStore>,
    pub(crate) jobs: Arc<RwLock<HashMap<JobId, Job>>>,
    pub(crate) workers: WorkerState,
    pub(crate) components: Components,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl JobManager {
    /// Create a manager with the HTTP fetcher and the SQLite index
    ///
    /// Creates the data directories. Nothing is loaded or scheduled until
    /// [`JobManager::startup`] runs.
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.download)?);
        let indexer = Arc::new(SqliteIndex::new(&config.index));
        Self::with_components(config, fetcher, indexer).await
    }

    /// Create a manager with caller-supplied transfer and index backends
    pub async fn with_components(
        config: Config,
        fetcher: Arc<dyn RangeFetcher>,
        indexer: Arc<dyn IndexBuilder>,
    ) -> Result<Self> {
        config.validate()?;

        for dir in [
            config.downloads_dir(),
            config.extracted_dir(),
            config.indexes_dir(),
        ] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                ))
            })?;
        }

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let components = Components {
            transfer: DownloadTransfer::new(fetcher, &config.download, config.retry.clone()),
            extractor: ArchiveExtractor::new(config.extraction.clone()),
            indexer,
        };

        let workers = WorkerState {
            capacity: Arc::new(Semaphore::new(config.download.max_concurrent_jobs)),
            active: Arc::new(std::sync::Mutex::new(HashMap::new())),
            accepting_new: Arc::new(AtomicBool::new(false)),
            started: Arc::new(tokio::sync::Mutex::new(false)),
        };

        tracing::info!(
            data_dir = %config.data_dir.display(),
            max_concurrent_jobs = config.download.max_concurrent_jobs,
            "job manager created"
        );

        Ok(Self {
            store: Arc::new(JobStore::new(config.jobs_file())),
            config: Arc::new(config),
            jobs: Arc::new(RwLock::new(HashMap::new())),
            workers,
            components,
            event_tx,
        })
    }

    /// Subscribe to job events
    ///
    /// Every subscriber receives every event sent after it subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// The configuration this manager runs with
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Send an event; having no subscribers is fine
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Fails with `NotRunning` before startup and `ShuttingDown` after shutdown
    pub(crate) async fn ensure_accepting(&self) -> Result<()> {
        if self.workers.accepting_new.load(Ordering::SeqCst) {
            return Ok(());
        }
        if *self.workers.started.lock().await {
            Err(Error::ShuttingDown)
        } else {
            Err(Error::NotRunning)
        }
    }

    /// Write every job to the store
    ///
    /// The snapshot is taken while holding the store lock, so a later call
    /// can never be overwritten by an earlier one.
    pub(crate) async fn persist(&self) -> std::result::Result<(), StoreError> {
        let guard = self.store.lock().await;
        let records: JobRecords = {
            let jobs = self.jobs.read().await;
            jobs.values()
                .map(|job| (job.id().clone(), job.snapshot()))
                .collect()
        };
        self.store.write(&guard, &records).await
    }

    /// [`JobManager::persist`], logging instead of returning failures
    pub(crate) async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            tracing::error!(error = %e, "failed to persist job store");
        }
    }
}
