//! Coalescing of stage progress into job updates.
//!
//! Stages publish their latest progress into a `watch` channel from whatever
//! context they run in (a transfer callback, a blocking extraction thread).
//! A forwarder task applies the newest value to the job, persists, emits an
//! event, then waits out `persistence.progress_persist_interval` before
//! looking again. Intermediate values are dropped.

use crate::job::Job;
use crate::types::{Event, JobId};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::JobManager;

/// Applies a progress value to a job, returning the event to emit
pub(crate) type ApplyProgress<T> = fn(&mut Job, &T) -> Option<Event>;

/// Handle to a running forwarder
pub(crate) struct ProgressForwarder {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressForwarder {
    /// Stop forwarding and wait until an in-flight update has been persisted
    ///
    /// The caller applies the final value itself afterwards.
    pub(crate) async fn finish(self) {
        self.stop.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "progress forwarder ended abnormally");
        }
    }
}

impl JobManager {
    pub(crate) fn forward_progress<T>(
        &self,
        id: &JobId,
        mut rx: watch::Receiver<T>,
        apply: ApplyProgress<T>,
    ) -> ProgressForwarder
    where
        T: Clone + Send + Sync + 'static,
    {
        let manager = self.clone();
        let id = id.clone();
        let interval = self.config.persistence.progress_persist_interval;
        let stop = CancellationToken::new();
        let stopped = stop.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stopped.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let value = rx.borrow_and_update().clone();
                let event = manager
                    .update_job(&id, |job| apply(job, &value))
                    .await
                    .flatten();
                manager.persist_logged().await;
                if let Some(event) = event {
                    manager.emit_event(event);
                }

                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        ProgressForwarder { stop, handle }
    }
}
