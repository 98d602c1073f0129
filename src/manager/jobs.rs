//! Job submission, queries, search and retry.

use crate::error::{JobError, Result};
use crate::job::{Job, JobInfo};
use crate::types::{Event, JobId, SearchHit, Stage};

use super::JobManager;

impl JobManager {
    /// Submit a new job for `url`
    ///
    /// The job is persisted before this returns; if that fails the job is
    /// dropped again and the store error is returned. Only `http` and
    /// `https` URLs are accepted.
    pub async fn create_job(&self, url: &str) -> Result<JobInfo> {
        self.ensure_accepting().await?;
        let url = validate_source_url(url)?;

        let id = JobId::generate();
        let job = Job::new(id.clone(), url.clone(), self.config.job_paths(&id));
        let info = job.snapshot();
        self.jobs.write().await.insert(id.clone(), job);

        if let Err(e) = self.persist().await {
            self.jobs.write().await.remove(&id);
            tracing::error!(job_id = %id, error = %e, "could not persist new job");
            return Err(e.into());
        }

        tracing::info!(job_id = %id, url = %url, "job queued");
        self.emit_event(Event::Queued {
            id: id.clone(),
            url,
        });
        self.schedule(&id);
        Ok(info)
    }

    /// Every job, oldest first
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self
            .jobs
            .read()
            .await
            .values()
            .map(Job::snapshot)
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// A snapshot of one job
    pub async fn get_job(&self, id: &JobId) -> Option<JobInfo> {
        self.jobs.read().await.get(id).map(Job::snapshot)
    }

    /// Full-text search within a completed job's index
    ///
    /// A blank query matches nothing. At most `index.search_limit` hits are
    /// returned, most relevant first.
    pub async fn search(&self, id: &JobId, query: &str) -> Result<Vec<SearchHit>> {
        let (stage, index_path) = self
            .read_job(id, |job| (job.stage(), job.index_path().clone()))
            .await?;
        if stage != Stage::Completed {
            return Err(JobError::NotReady {
                id: id.clone(),
                stage,
            }
            .into());
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let hits = self
            .components
            .indexer
            .search(&index_path, query, self.config.index.search_limit)
            .await?;
        tracing::debug!(job_id = %id, query, hits = hits.len(), "search");
        Ok(hits)
    }

    /// Put a failed job back in the queue
    ///
    /// The job resumes from whatever is on disk: a partial archive is
    /// continued, extraction and indexing start over.
    pub async fn retry_job(&self, id: &JobId) -> Result<JobInfo> {
        self.ensure_accepting().await?;

        let info = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| JobError::NotFound { id: id.clone() })?;
            if job.stage() != Stage::Failed {
                return Err(JobError::InvalidState {
                    id: id.clone(),
                    operation: "retry".to_string(),
                    current: job.stage(),
                }
                .into());
            }
            job.transition(Stage::Queued)?;
            job.set_status("Queued for retry");
            job.snapshot()
        };

        self.persist_logged().await;
        tracing::info!(job_id = %id, "job re-queued for retry");
        self.emit_event(Event::StageChanged {
            id: id.clone(),
            from: Stage::Failed,
            to: Stage::Queued,
        });
        self.schedule(id);
        Ok(info)
    }

    /// Run `f` against a job, or fail with `JobError::NotFound`
    pub(crate) async fn read_job<R>(&self, id: &JobId, f: impl FnOnce(&Job) -> R) -> Result<R> {
        self.jobs
            .read()
            .await
            .get(id)
            .map(f)
            .ok_or_else(|| JobError::NotFound { id: id.clone() }.into())
    }

    /// Mutate a job in place; `None` when it does not exist
    pub(crate) async fn update_job<R>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> R,
    ) -> Option<R> {
        self.jobs.write().await.get_mut(id).map(f)
    }
}

fn validate_source_url(raw: &str) -> std::result::Result<String, JobError> {
    let trimmed = raw.trim();
    let invalid = |reason: String| JobError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(parsed.to_string())
}
