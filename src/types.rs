//! Core types shared across the crate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use utoipa::ToSchema;

/// Unique identifier for a job
///
/// A ULID in its canonical 26-character form. Ids are time-ordered, never
/// reused, and safe to embed in file names.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Allocate a fresh id
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = ulid::DecodeError;

    /// Parse an id, accepting any letter case; the stored form is canonical
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = Ulid::from_string(&s.to_ascii_uppercase())?;
        Ok(Self(ulid.to_string()))
    }
}

/// Pipeline stage of a job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Waiting for a worker
    Queued,
    /// Fetching the archive
    Downloading,
    /// Unpacking the archive
    Extracting,
    /// Building the search index
    Indexing,
    /// Index is searchable (terminal)
    Completed,
    /// A stage failed; see the job's error message
    Failed,
}

impl Stage {
    /// The stage that follows a successful run of this one
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Queued => Some(Stage::Downloading),
            Stage::Downloading => Some(Stage::Extracting),
            Stage::Extracting => Some(Stage::Indexing),
            Stage::Indexing => Some(Stage::Completed),
            Stage::Completed | Stage::Failed => None,
        }
    }

    /// A worker is (or was, before a crash) running this stage
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Stage::Downloading | Stage::Extracting | Stage::Indexing
        )
    }

    /// No worker will pick the job up again on its own
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Whether the state machine allows `self -> to`
    pub fn can_transition_to(self, to: Stage) -> bool {
        match (self, to) {
            (from, to) if from.next() == Some(to) => true,
            // restart recovery
            (from, Stage::Queued) if from.is_in_flight() => true,
            // explicit resubmission
            (Stage::Failed, Stage::Queued) => true,
            (from, Stage::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Lowercase name as used on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
            Stage::Indexing => "indexing",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search result from a job's index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchHit {
    /// Document identifier within the index (conversation id or relative path)
    pub id: String,
    /// Document title
    pub title: String,
    /// Document timestamp (RFC 3339), empty when unknown
    pub timestamp: String,
    /// Excerpt with matches wrapped in `[` and `]`
    pub snippet: String,
}

/// Event emitted by the job manager
///
/// Subscribe via [`JobManager::subscribe`](crate::JobManager::subscribe).
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was created
    Queued {
        /// Job ID
        id: JobId,
        /// Source URL
        url: String,
    },

    /// A job moved between stages
    StageChanged {
        /// Job ID
        id: JobId,
        /// Previous stage
        from: Stage,
        /// New stage
        to: Stage,
    },

    /// An interrupted job was put back in the queue at startup
    Requeued {
        /// Job ID
        id: JobId,
        /// Stage the job was in when the process stopped
        previous_stage: Stage,
    },

    /// Archive bytes written
    DownloadProgress {
        /// Job ID
        id: JobId,
        /// Bytes on disk
        downloaded: u64,
        /// Total size, if the server announced it
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },

    /// A transient transfer failure is being retried
    Retrying {
        /// Job ID
        id: JobId,
        /// Retry number within the current stage (1-based)
        attempt: u32,
        /// The failure being retried
        error: String,
    },

    /// Archive entries written
    ExtractProgress {
        /// Job ID
        id: JobId,
        /// Entries written so far
        extracted: u64,
        /// Entries in the archive
        total: u64,
    },

    /// Documents added to the index
    IndexProgress {
        /// Job ID
        id: JobId,
        /// Documents indexed so far
        indexed: u64,
        /// Documents discovered
        total: u64,
    },

    /// The index is ready for search
    Completed {
        /// Job ID
        id: JobId,
        /// Number of documents in the index
        documents: u64,
    },

    /// A stage failed
    Failed {
        /// Job ID
        id: JobId,
        /// Stage that failed
        stage: Stage,
        /// Diagnostic message
        error: String,
    },

    /// Manager is shutting down
    Shutdown,
}
