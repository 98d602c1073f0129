//! Startup recovery and graceful shutdown.

use crate::error::Result;
use crate::job::Job;
use crate::types::{Event, JobId, Stage};
use std::sync::PoisonError;
use std::sync::atomic::Ordering;
use std::time::Duration;

use super::JobManager;

/// How often shutdown checks whether workers have stopped
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Status of a job that was mid-stage when the process stopped
const REQUEUED_STATUS: &str = "Re-queued after restart";

/// Error of a persisted job that cannot be resumed
const MISSING_URL: &str = "Missing source URL; cannot resume";

impl JobManager {
    /// Load persisted jobs, recover interrupted ones and start accepting work
    ///
    /// Jobs that were downloading, extracting or indexing when the process
    /// stopped go back to `queued`; their artifacts stay on disk, so a
    /// download resumes where it stopped and later stages run again from
    /// scratch. Every queued job is then scheduled. Completed and failed jobs
    /// are left as they are.
    ///
    /// An unreadable or corrupt job store is an error: starting without it
    /// would lose track of artifacts on disk.
    ///
    /// Calling this again is a no-op. Returns the ids that were scheduled.
    pub async fn startup(&self) -> Result<Vec<JobId>> {
        let mut started = self.workers.started.lock().await;
        if *started {
            return Ok(Vec::new());
        }

        let records = self.store.load().await?;
        let loaded = records.len();
        let mut events = Vec::new();
        let queued = {
            let mut jobs = self.jobs.write().await;
            for info in records {
                let mut job = Job::restore(info);
                let id = job.id().clone();
                let stage = job.stage();

                if !stage.is_terminal() && job.source_url().trim().is_empty() {
                    job.fail(MISSING_URL)?;
                    tracing::warn!(job_id = %id, "persisted job has no source URL");
                    events.push(Event::Failed {
                        id: id.clone(),
                        stage,
                        error: MISSING_URL.to_string(),
                    });
                } else if stage.is_in_flight() {
                    job.transition(Stage::Queued)?;
                    job.set_status(REQUEUED_STATUS);
                    tracing::info!(job_id = %id, previous_stage = %stage, "re-queued interrupted job");
                    events.push(Event::Requeued {
                        id: id.clone(),
                        previous_stage: stage,
                    });
                }
                jobs.insert(id, job);
            }

            let mut queued: Vec<(chrono::DateTime<chrono::Utc>, JobId)> = jobs
                .values()
                .filter(|job| job.stage() == Stage::Queued)
                .map(|job| (job.snapshot().created_at, job.id().clone()))
                .collect();
            queued.sort();
            queued.into_iter().map(|(_, id)| id).collect::<Vec<_>>()
        };

        self.persist().await?;

        *started = true;
        self.workers.accepting_new.store(true, Ordering::SeqCst);
        drop(started);

        for event in events {
            self.emit_event(event);
        }
        for id in &queued {
            self.schedule(id);
        }

        tracing::info!(
            loaded,
            scheduled = queued.len(),
            "job manager started"
        );
        Ok(queued)
    }

    /// Stop accepting work and wind down running jobs
    ///
    /// Active workers are cancelled: a download stops after its current chunk
    /// and keeps its partial archive; extraction and indexing cannot be
    /// interrupted and are given up to `persistence.shutdown_timeout` to end.
    /// Whatever stage a job is left in is recovered by the next `startup`.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating graceful shutdown");
        self.workers.accepting_new.store(false, Ordering::SeqCst);

        {
            let active = self
                .workers
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            tracing::debug!(active_count = active.len(), "cancelling active workers");
            for token in active.values() {
                token.cancel();
            }
        }

        let timeout = self.config.persistence.shutdown_timeout;
        if tokio::time::timeout(timeout, self.wait_for_workers())
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "timed out waiting for workers, proceeding with shutdown"
            );
        }

        let persisted = self.persist().await;
        if let Err(e) = &persisted {
            tracing::error!(error = %e, "failed to persist job store during shutdown");
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("shutdown complete");
        persisted.map_err(Into::into)
    }

    async fn wait_for_workers(&self) {
        loop {
            let active_count = self
                .workers
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "waiting for workers to stop");
            tokio::time::sleep(WORKER_POLL_INTERVAL).await;
        }
    }
}
