//! The persistent job record and its read-only snapshot

use crate::config::JobPaths;
use crate::error::JobError;
use crate::types::{JobId, Stage};
use crate::utils::format_bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use utoipa::ToSchema;

/// Point-in-time copy of every job field
///
/// This is what callers receive and what the job store persists. `progress`
/// is informational: it is recomputed from the stage counters whenever a
/// snapshot is taken and ignored when a record is loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Job ID
    pub id: JobId,
    /// Remote resource being ingested
    pub source_url: String,
    /// Current stage
    pub stage: Stage,
    /// Downloaded archive location
    #[schema(value_type = String)]
    pub archive_path: PathBuf,
    /// Extraction directory
    #[schema(value_type = String)]
    pub extract_dir: PathBuf,
    /// Search index location
    #[schema(value_type = String)]
    pub index_path: PathBuf,
    /// Archive bytes on disk
    #[serde(default)]
    pub bytes_downloaded: u64,
    /// Archive size, once the server announced it
    #[serde(default)]
    pub bytes_total: Option<u64>,
    /// Archive entries written in the current extraction
    #[serde(default)]
    pub entries_extracted: u64,
    /// Entries in the archive
    #[serde(default)]
    pub entries_total: Option<u64>,
    /// Documents written to the index in the current indexing run
    #[serde(default)]
    pub documents_indexed: u64,
    /// Documents discovered in the extracted tree
    #[serde(default)]
    pub documents_total: Option<u64>,
    /// Stage-local completion in `[0.0, 1.0]`
    #[serde(default)]
    pub progress: f64,
    /// Human-readable current activity
    #[serde(default)]
    pub status_message: String,
    /// Last failure diagnostic; kept until the job completes
    #[serde(default)]
    pub error_message: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last mutation
    pub updated_at: DateTime<Utc>,
    /// Transient failures retried in the current stage
    #[serde(default)]
    pub retry_count: u32,
}

/// Mutable job record, owned by the manager
///
/// Every mutator refreshes `updated_at`. Counters only move forward within a
/// stage; entering a stage resets that stage's counters.
#[derive(Clone, Debug)]
pub(crate) struct Job {
    info: JobInfo,
}

impl Job {
    pub(crate) fn new(id: JobId, source_url: String, paths: JobPaths) -> Self {
        let now = Utc::now();
        let mut job = Self {
            info: JobInfo {
                id,
                source_url,
                stage: Stage::Queued,
                archive_path: paths.archive_path,
                extract_dir: paths.extract_dir,
                index_path: paths.index_path,
                bytes_downloaded: 0,
                bytes_total: None,
                entries_extracted: 0,
                entries_total: None,
                documents_indexed: 0,
                documents_total: None,
                progress: 0.0,
                status_message: "Queued".to_string(),
                error_message: None,
                created_at: now,
                updated_at: now,
                retry_count: 0,
            },
        };
        job.refresh_progress();
        job
    }

    /// Rebuild a job from a persisted record
    pub(crate) fn restore(info: JobInfo) -> Self {
        let mut job = Self { info };
        job.refresh_progress();
        job
    }

    pub(crate) fn snapshot(&self) -> JobInfo {
        self.info.clone()
    }

    pub(crate) fn id(&self) -> &JobId {
        &self.info.id
    }

    pub(crate) fn stage(&self) -> Stage {
        self.info.stage
    }

    pub(crate) fn source_url(&self) -> &str {
        &self.info.source_url
    }

    pub(crate) fn archive_path(&self) -> &PathBuf {
        &self.info.archive_path
    }

    pub(crate) fn extract_dir(&self) -> &PathBuf {
        &self.info.extract_dir
    }

    pub(crate) fn index_path(&self) -> &PathBuf {
        &self.info.index_path
    }

    pub(crate) fn bytes_total(&self) -> Option<u64> {
        self.info.bytes_total
    }

    pub(crate) fn retry_count(&self) -> u32 {
        self.info.retry_count
    }

    /// Move to `to`, enforcing the stage machine
    ///
    /// Resets the retry counter and the counters of the entered stage.
    /// Downloaded bytes survive every transition so a requeued download resumes.
    pub(crate) fn transition(&mut self, to: Stage) -> Result<Stage, JobError> {
        let from = self.info.stage;
        if !from.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                id: self.info.id.clone(),
                from,
                to,
            });
        }

        self.info.stage = to;
        self.info.retry_count = 0;
        match to {
            Stage::Extracting => {
                self.info.entries_extracted = 0;
                self.info.entries_total = None;
            }
            Stage::Indexing => {
                self.info.documents_indexed = 0;
                self.info.documents_total = None;
            }
            Stage::Completed => self.info.error_message = None,
            _ => {}
        }
        self.info.status_message = default_status(to).to_string();
        self.touch();
        Ok(from)
    }

    /// Record a stage failure
    pub(crate) fn fail(&mut self, message: impl Into<String>) -> Result<Stage, JobError> {
        let from = self.transition(Stage::Failed)?;
        let message = message.into();
        self.info.status_message = format!("Failed while {}", activity(from));
        self.info.error_message = Some(message);
        self.touch();
        Ok(from)
    }

    pub(crate) fn set_status(&mut self, message: impl Into<String>) {
        self.info.status_message = message.into();
        self.touch();
    }

    /// Align the byte counter with the archive actually on disk
    ///
    /// Called when a download run starts. The stored counter may be ahead of
    /// the file after a power loss or if the partial archive was removed;
    /// within the run [`Job::record_download`] only moves it forward.
    pub(crate) fn reset_download(&mut self, on_disk: u64) {
        self.info.bytes_downloaded = on_disk;
        self.refresh_download_status();
        self.touch();
    }

    pub(crate) fn record_download(&mut self, downloaded: u64, total: Option<u64>) {
        self.info.bytes_downloaded = self.info.bytes_downloaded.max(downloaded);
        if total.is_some() {
            self.info.bytes_total = total;
        }
        self.refresh_download_status();
        self.touch();
    }

    fn refresh_download_status(&mut self) {
        self.info.status_message = match self.info.bytes_total {
            Some(total) => format!(
                "Downloaded {} of {}",
                format_bytes(self.info.bytes_downloaded),
                format_bytes(total)
            ),
            None => format!("Downloaded {}", format_bytes(self.info.bytes_downloaded)),
        };
    }

    pub(crate) fn record_retry(&mut self, attempt: u32, error: &str) {
        self.info.retry_count = self.info.retry_count.max(attempt);
        self.info.status_message = format!("Retrying after error (attempt {attempt}): {error}");
        self.touch();
    }

    pub(crate) fn record_extraction(&mut self, extracted: u64, total: u64) {
        self.info.entries_extracted = self.info.entries_extracted.max(extracted);
        self.info.entries_total = Some(total);
        self.info.status_message = format!(
            "Extracted {}/{} entries",
            self.info.entries_extracted, total
        );
        self.touch();
    }

    pub(crate) fn record_indexing(&mut self, indexed: u64, total: u64) {
        self.info.documents_indexed = self.info.documents_indexed.max(indexed);
        self.info.documents_total = Some(total);
        self.info.status_message = format!(
            "Indexed {}/{} documents",
            self.info.documents_indexed, total
        );
        self.touch();
    }

    fn touch(&mut self) {
        let now = Utc::now();
        if now > self.info.updated_at {
            self.info.updated_at = now;
        }
        self.refresh_progress();
    }

    fn refresh_progress(&mut self) {
        let info = &self.info;
        let progress = match info.stage {
            Stage::Downloading => ratio(info.bytes_downloaded, info.bytes_total),
            Stage::Extracting => ratio(info.entries_extracted, info.entries_total),
            Stage::Indexing => ratio(info.documents_indexed, info.documents_total),
            Stage::Completed => 1.0,
            Stage::Queued | Stage::Failed => 0.0,
        };
        self.info.progress = progress;
    }
}

fn ratio(done: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => (done as f64 / total as f64).clamp(0.0, 1.0),
        _ => 0.0,
    }
}

fn default_status(stage: Stage) -> &'static str {
    match stage {
        Stage::Queued => "Queued",
        Stage::Downloading => "Starting download",
        Stage::Extracting => "Unpacking archive",
        Stage::Indexing => "Building search index",
        Stage::Completed => "Index ready",
        Stage::Failed => "Failed",
    }
}

fn activity(stage: Stage) -> &'static str {
    match stage {
        Stage::Queued => "queued",
        Stage::Downloading => "downloading",
        Stage::Extracting => "extracting",
        Stage::Indexing => "indexing",
        Stage::Completed | Stage::Failed => "finishing",
    }
}
