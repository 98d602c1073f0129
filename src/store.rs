//! Durable job records
//!
//! All jobs live in a single JSON document mapping job id to [`JobInfo`].
//! Every write replaces the whole file atomically: the new content goes to a
//! sibling `.tmp` file, is fsynced, then renamed over the store.

use crate::error::StoreError;
use crate::job::JobInfo;
use crate::types::JobId;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::spawn_blocking;

/// Job records keyed by id, in the order they are written to disk
pub type JobRecords = BTreeMap<JobId, JobInfo>;

/// File-backed job store
#[derive(Debug)]
pub struct JobStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JobStore {
    /// Store backed by `path`; nothing is touched until the first load or write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Read every persisted record
    ///
    /// A missing file is an empty store. Anything else that prevents reading
    /// every record is an error; records are never silently dropped.
    pub async fn load(&self) -> Result<Vec<JobInfo>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Unreadable {
                    path: self.path.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let records: JobRecords =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        if let Some((key, info)) = records.iter().find(|(key, info)| **key != info.id) {
            return Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: format!("record stored under {key} carries id {}", info.id),
            });
        }

        tracing::debug!(path = %self.path.display(), jobs = records.len(), "loaded job store");
        Ok(records.into_values().collect())
    }

    /// Serialize writers
    ///
    /// Callers take the lock before snapshotting so that the snapshot written
    /// last is also the newest one.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// Replace the store with `records`; the caller must hold [`JobStore::lock`]
    pub async fn write(
        &self,
        _guard: &MutexGuard<'_, ()>,
        records: &JobRecords,
    ) -> Result<(), StoreError> {
        let failed = |reason: String| StoreError::WriteFailed {
            path: self.path.clone(),
            reason,
        };
        let content = serde_json::to_vec_pretty(records).map_err(|e| failed(e.to_string()))?;
        let path = self.path.clone();

        spawn_blocking(move || replace_file(&path, &content))
            .await
            .map_err(|e| failed(e.to_string()))?
            .map_err(|e| failed(e.to_string()))
    }

    /// Take the write lock and replace the store with `records`
    pub async fn save(&self, records: &JobRecords) -> Result<(), StoreError> {
        let guard = self.lock().await;
        self.write(&guard, records).await
    }
}

fn replace_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;

    // make the rename itself durable
    #[cfg(unix)]
    if let Some(parent) = parent {
        std::fs::File::open(parent)?.sync_all()?;
    }
    Ok(())
}
