//! SQLite FTS5 index

use super::IndexBuilder;
use super::documents::{Document, discover_documents};
use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::types::SearchHit;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;

/// Full-text index stored as one SQLite file per job
#[derive(Clone, Debug)]
pub struct SqliteIndex {
    text_extensions: Vec<String>,
}

impl Default for SqliteIndex {
    fn default() -> Self {
        Self::new(&IndexConfig::default())
    }
}

impl SqliteIndex {
    /// Create an index builder using the configured text extensions
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            text_extensions: config
                .text_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    async fn discover(&self, source: &Path) -> Result<Vec<Document>, IndexError> {
        let source = source.to_path_buf();
        let extensions = self.text_extensions.clone();
        spawn_blocking(move || discover_documents(&source, &extensions))
            .await
            .map_err(|e| IndexError::TaskFailed(e.to_string()))?
    }
}

#[async_trait]
impl IndexBuilder for SqliteIndex {
    async fn ingest(
        &self,
        source: &Path,
        index_path: &Path,
        progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> Result<u64, IndexError> {
        let documents = self.discover(source).await?;
        if documents.is_empty() {
            return Err(IndexError::NoDocuments {
                source_path: source.to_path_buf(),
            });
        }
        let total = documents.len() as u64;
        progress(0, total);

        if let Some(parent) = index_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = staging_path(index_path);
        remove_if_exists(&staging).await?;

        let mut conn = open(&staging, false).await?;
        let written = write_documents(&mut conn, &documents, progress).await;
        conn.close().await?;
        if let Err(e) = written {
            remove_if_exists(&staging).await?;
            return Err(e);
        }

        tokio::fs::rename(&staging, index_path).await?;
        tracing::info!(
            index = %index_path.display(),
            documents = total,
            "index built"
        );
        Ok(total)
    }

    async fn search(
        &self,
        index_path: &Path,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };

        let mut conn = open(index_path, true).await?;
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT doc_id, title, timestamp, snippet(documents, 3, '[', ']', '…', 10)
            FROM documents
            WHERE documents MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(expression)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        Ok(rows
            .into_iter()
            .map(|(id, title, timestamp, snippet)| SearchHit {
                id,
                title,
                timestamp,
                snippet,
            })
            .collect())
    }
}

async fn open(path: &Path, read_only: bool) -> Result<SqliteConnection, IndexError> {
    // a plain filename, so `?` and `#` in the path are not read as URL syntax
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(!read_only)
        .read_only(read_only)
        .journal_mode(SqliteJournalMode::Delete);
    Ok(options.connect().await?)
}

async fn write_documents(
    conn: &mut SqliteConnection,
    documents: &[Document],
    progress: &(dyn Fn(u64, u64) + Send + Sync),
) -> Result<(), IndexError> {
    sqlx::query(
        "CREATE VIRTUAL TABLE documents USING fts5(doc_id UNINDEXED, title, timestamp, content)",
    )
    .execute(&mut *conn)
    .await?;

    let total = documents.len() as u64;
    let mut tx = conn.begin().await?;
    for (i, doc) in documents.iter().enumerate() {
        sqlx::query("INSERT INTO documents (doc_id, title, timestamp, content) VALUES (?, ?, ?, ?)")
            .bind(&doc.id)
            .bind(&doc.title)
            .bind(&doc.timestamp)
            .bind(&doc.content)
            .execute(&mut *tx)
            .await?;
        progress(i as u64 + 1, total);
    }
    tx.commit().await?;
    Ok(())
}

fn staging_path(index_path: &Path) -> PathBuf {
    let mut name = index_path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Quote every whitespace-separated term so user input is never parsed as FTS syntax
///
/// Terms are ANDed. Returns `None` for a blank query.
pub(crate) fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}
