//! Searchable index over an extracted backup
//!
//! The manager only talks to the [`IndexBuilder`] trait; [`SqliteIndex`] is the
//! production implementation, one FTS5 database per job.

mod documents;
mod sqlite;

pub use documents::{Document, discover_documents};
pub use sqlite::SqliteIndex;

use crate::error::IndexError;
use crate::types::SearchHit;
use async_trait::async_trait;
use std::path::Path;

/// Builds and queries a job's full-text index
#[async_trait]
pub trait IndexBuilder: Send + Sync {
    /// Rebuild the index at `index_path` from everything under `source`
    ///
    /// Any previous index is replaced, so running this again after a crash is
    /// safe. `progress(indexed, total)` is called as documents are written.
    /// Returns the number of documents indexed; an empty source is
    /// [`IndexError::NoDocuments`].
    async fn ingest(
        &self,
        source: &Path,
        index_path: &Path,
        progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> Result<u64, IndexError>;

    /// Query a built index, most relevant first
    async fn search(
        &self,
        index_path: &Path,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError>;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
