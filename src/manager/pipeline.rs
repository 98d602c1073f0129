//! Per-job worker and the stage handlers.

use crate::error::{Error, JobError, Result};
use crate::job::Job;
use crate::transfer::{TransferOutcome, TransferProgress};
use crate::types::{Event, JobId, Stage};
use crate::utils::file_len;
use std::sync::PoisonError;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::JobManager;

/// What the worker does after a stage handler returns
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    /// The stage finished; move to the next one
    Advance,
    /// Stop without changing the stage (cancelled)
    Stop,
}

/// Latest state of a running transfer
#[derive(Clone, Debug, Default)]
struct DownloadState {
    downloaded: u64,
    total: Option<u64>,
    retries: u32,
    last_error: String,
    retrying: bool,
}

impl DownloadState {
    fn record(&mut self, progress: TransferProgress) {
        match progress {
            TransferProgress::Bytes { downloaded, total } => {
                self.downloaded = downloaded;
                self.total = total;
                self.retrying = false;
            }
            TransferProgress::Retrying { attempt, error } => {
                self.retries = attempt;
                self.last_error = error;
                self.retrying = true;
            }
        }
    }
}

fn apply_download(job: &mut Job, state: &DownloadState) -> Option<Event> {
    if state.retries > job.retry_count() || state.retrying {
        job.record_retry(state.retries, &state.last_error);
    }
    if state.retrying {
        return None;
    }
    job.record_download(state.downloaded, state.total);
    Some(Event::DownloadProgress {
        id: job.id().clone(),
        downloaded: state.downloaded,
        total: state.total,
    })
}

fn apply_extraction(job: &mut Job, &(extracted, total): &(u64, u64)) -> Option<Event> {
    job.record_extraction(extracted, total);
    Some(Event::ExtractProgress {
        id: job.id().clone(),
        extracted,
        total,
    })
}

fn apply_indexing(job: &mut Job, &(indexed, total): &(u64, u64)) -> Option<Event> {
    job.record_indexing(indexed, total);
    Some(Event::IndexProgress {
        id: job.id().clone(),
        indexed,
        total,
    })
}

impl JobManager {
    /// Start a worker for `id` unless one is already running
    ///
    /// Returns whether a worker was started. Workers wait for a free slot
    /// before running and give it back when the job stops.
    pub(crate) fn schedule(&self, id: &JobId) -> bool {
        if !self.workers.accepting_new.load(Ordering::SeqCst) {
            return false;
        }
        let token = CancellationToken::new();
        {
            let mut active = self
                .workers
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if active.contains_key(id) {
                tracing::debug!(job_id = %id, "worker already running");
                return false;
            }
            active.insert(id.clone(), token.clone());
        }

        let manager = self.clone();
        let id = id.clone();
        tokio::spawn(async move { manager.run_worker(id, token).await });
        true
    }

    async fn run_worker(self, id: JobId, cancel: CancellationToken) {
        let permit = tokio::select! {
            permit = self.workers.capacity.clone().acquire_owned() => permit.ok(),
            _ = cancel.cancelled() => None,
        };
        if let Some(_permit) = permit {
            self.drive(&id, &cancel).await;
        }

        self.workers
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        // a retry may have re-queued the job while this worker was winding down
        if !cancel.is_cancelled()
            && matches!(
                self.read_job(&id, Job::stage).await,
                Ok(Stage::Queued)
            )
        {
            self.schedule(&id);
        }
    }

    /// Run stage handlers until the job is terminal or the worker is cancelled
    async fn drive(&self, id: &JobId, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                tracing::debug!(job_id = %id, "worker cancelled");
                return;
            }
            let stage = match self.read_job(id, Job::stage).await {
                Ok(stage) => stage,
                Err(_) => return,
            };

            let result = match stage {
                Stage::Queued => Ok(Flow::Advance),
                Stage::Downloading => self.run_download(id, cancel).await,
                Stage::Extracting => self.run_extraction(id).await,
                Stage::Indexing => self.run_indexing(id).await,
                Stage::Completed | Stage::Failed => return,
            };

            match result {
                Ok(Flow::Advance) => {
                    if let Err(e) = self.advance(id).await {
                        tracing::error!(job_id = %id, error = %e, "could not advance job");
                        return;
                    }
                }
                Ok(Flow::Stop) => return,
                Err(e) => {
                    self.fail(id, e.to_string()).await;
                    return;
                }
            }
        }
    }

    /// Move a job to its next stage
    ///
    /// Completed and failed jobs are left alone.
    pub(crate) async fn advance(&self, id: &JobId) -> Result<()> {
        let (from, to, documents) = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| JobError::NotFound { id: id.clone() })?;
            let Some(next) = job.stage().next() else {
                return Ok(());
            };
            let from = job.transition(next)?;
            (from, next, job.snapshot().documents_indexed)
        };

        self.persist_logged().await;
        tracing::info!(job_id = %id, from = %from, to = %to, "stage changed");
        self.emit_event(Event::StageChanged {
            id: id.clone(),
            from,
            to,
        });
        if to == Stage::Completed {
            self.emit_event(Event::Completed {
                id: id.clone(),
                documents,
            });
        }
        Ok(())
    }

    /// Mark a job failed with `message`
    pub(crate) async fn fail(&self, id: &JobId, message: String) {
        let Some(result) = self.update_job(id, |job| job.fail(message.clone())).await else {
            return;
        };
        match result {
            Ok(stage) => {
                self.persist_logged().await;
                tracing::warn!(job_id = %id, stage = %stage, error = %message, "job failed");
                self.emit_event(Event::Failed {
                    id: id.clone(),
                    stage,
                    error: message,
                });
            }
            Err(e) => tracing::warn!(job_id = %id, error = %e, "could not mark job failed"),
        }
    }

    async fn run_download(&self, id: &JobId, cancel: &CancellationToken) -> Result<Flow> {
        let (url, archive, known_total) = self
            .read_job(id, |job| {
                (
                    job.source_url().to_string(),
                    job.archive_path().clone(),
                    job.bytes_total(),
                )
            })
            .await?;

        let existing = file_len(&archive).await?;
        if let Some(total) = known_total
            && existing == Some(total)
        {
            tracing::info!(job_id = %id, bytes = total, "archive already complete on disk");
            self.update_job(id, |job| {
                job.reset_download(total);
                job.record_download(total, Some(total));
            })
            .await;
            return Ok(Flow::Advance);
        }
        // the transfer resumes from the file, so the counter must start there too
        let on_disk = existing.unwrap_or(0);
        self.update_job(id, |job| job.reset_download(on_disk)).await;
        self.persist_logged().await;
        tracing::debug!(job_id = %id, on_disk, "download run starting");
        if let Some(parent) = archive.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (tx, rx) = watch::channel(DownloadState::default());
        let forwarder = self.forward_progress(id, rx, apply_download);
        let event_tx = self.event_tx.clone();
        let result = self
            .components
            .transfer
            .transfer(&url, &archive, cancel, |progress| {
                if let TransferProgress::Retrying { attempt, error } = &progress {
                    event_tx
                        .send(Event::Retrying {
                            id: id.clone(),
                            attempt: *attempt,
                            error: error.clone(),
                        })
                        .ok();
                }
                tx.send_modify(|state| state.record(progress));
            })
            .await;
        forwarder.finish().await;

        let mut last = tx.borrow().clone();
        last.retrying = false;
        match result {
            Ok(TransferOutcome::Completed { bytes }) => {
                last.downloaded = bytes;
                last.total = Some(bytes);
                self.update_job(id, |job| apply_download(job, &last)).await;
                tracing::info!(job_id = %id, bytes, "download complete");
                Ok(Flow::Advance)
            }
            Ok(TransferOutcome::Cancelled { bytes }) => {
                last.downloaded = bytes;
                self.update_job(id, |job| {
                    apply_download(job, &last);
                    job.set_status("Download paused");
                })
                .await;
                self.persist_logged().await;
                tracing::info!(job_id = %id, bytes, "download paused");
                Ok(Flow::Stop)
            }
            Err(e) => {
                self.update_job(id, |job| apply_download(job, &last)).await;
                Err(e.into())
            }
        }
    }

    async fn run_extraction(&self, id: &JobId) -> Result<Flow> {
        let (archive, target) = self
            .read_job(id, |job| (job.archive_path().clone(), job.extract_dir().clone()))
            .await?;

        let (tx, rx) = watch::channel((0u64, 0u64));
        let forwarder = self.forward_progress(id, rx, apply_extraction);
        let result = self
            .components
            .extractor
            .extract_async(&archive, &target, move |extracted, total| {
                tx.send_replace((extracted, total));
            })
            .await;
        forwarder.finish().await;

        let entries = result?;
        self.update_job(id, |job| job.record_extraction(entries, entries))
            .await;
        Ok(Flow::Advance)
    }

    async fn run_indexing(&self, id: &JobId) -> Result<Flow> {
        let (source, index_path) = self
            .read_job(id, |job| (job.extract_dir().clone(), job.index_path().clone()))
            .await?;

        let (tx, rx) = watch::channel((0u64, 0u64));
        let forwarder = self.forward_progress(id, rx, apply_indexing);
        let result = self
            .components
            .indexer
            .ingest(&source, &index_path, &|indexed, total| {
                tx.send_replace((indexed, total));
            })
            .await;
        forwarder.finish().await;

        let documents = result?;
        if documents == 0 {
            return Err(Error::Index(crate::error::IndexError::NoDocuments {
                source_path: source,
            }));
        }
        self.update_job(id, |job| job.record_indexing(documents, documents))
            .await;
        tracing::info!(job_id = %id, documents, "index built");
        Ok(Flow::Advance)
    }
}
