use super::*;
use crate::config::{DownloadConfig, PersistenceConfig, RetryConfig};
use crate::error::{IndexError, TransferError};
use crate::job::JobInfo;
use crate::transfer::{RangeBody, RangeResponse};
use crate::types::{SearchHit, Stage};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;
use std::time::Duration;


const WAIT_LIMIT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn test_config(dir: &Path) -> Config {
    Config {
        data_dir: dir.to_path_buf(),
        download: DownloadConfig {
            chunk_size: 3,
            read_timeout: Duration::from_secs(5),
            ..DownloadConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        persistence: PersistenceConfig {
            progress_persist_interval: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(5),
            ..PersistenceConfig::default()
        },
        ..Config::default()
    }
}

/// A stored ZIP archive holding `files`
fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn export_archive() -> Vec<u8> {
    let conversations = serde_json::json!([{
        "id": "conv-1",
        "title": "Road trip",
        "create_time": 1700000000.0,
        "mapping": {
            "a": { "message": { "author": { "role": "user" }, "create_time": 1.0,
                    "content": { "parts": ["Is the coastal road open in winter?"] } } }
        }
    }])
    .to_string();
    zip_bytes(&[("conversations.json", conversations.as_bytes())])
}

/// Serves a fixed body in small chunks, with scripted failures
struct ScriptedFetcher {
    content: Vec<u8>,
    chunk: usize,
    fail_at: Mutex<Option<u64>>,
    forbidden: AtomicU32,
    hold: AtomicBool,
    offsets: Mutex<Vec<u64>>,
}

impl ScriptedFetcher {
    fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            chunk: 3,
            fail_at: Mutex::new(None),
            forbidden: AtomicU32::new(0),
            hold: AtomicBool::new(false),
            offsets: Mutex::new(Vec::new()),
        }
    }

    /// Drop the connection once after `byte` bytes
    fn failing_once_at(self, byte: u64) -> Self {
        *self.fail_at.lock().unwrap() = Some(byte);
        self
    }

    /// Answer the next `times` requests with HTTP 403
    fn forbidden(self, times: u32) -> Self {
        self.forbidden.store(times, Ordering::SeqCst);
        self
    }

    /// Never answer
    fn holding(self) -> Self {
        self.hold.store(true, Ordering::SeqCst);
        self
    }

    fn offsets(&self) -> Vec<u64> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl RangeFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, offset: u64) -> std::result::Result<RangeResponse, TransferError> {
        self.offsets.lock().unwrap().push(offset);
        if self.hold.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self
            .forbidden
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransferError::HttpStatus {
                status: 403,
                url: url.to_string(),
            });
        }

        let fail_at = self.fail_at.lock().unwrap().take().filter(|n| *n > offset);
        let end = fail_at.unwrap_or(self.content.len() as u64) as usize;
        let mut items: Vec<std::result::Result<Bytes, TransferError>> = self.content
            [offset as usize..end]
            .chunks(self.chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if fail_at.is_some() {
            items.push(Err(TransferError::Connection(
                "connection reset by peer".into(),
            )));
        }

        Ok(RangeResponse::Body(RangeBody {
            start: offset,
            total: Some(self.content.len() as u64),
            body: futures::stream::iter(items).boxed(),
        }))
    }
}

/// Reports a fixed document count without touching the disk
struct FakeIndexer {
    documents: u64,
    sources: Mutex<Vec<PathBuf>>,
}

impl FakeIndexer {
    fn new(documents: u64) -> Self {
        Self {
            documents,
            sources: Mutex::new(Vec::new()),
        }
    }

    fn sources(&self) -> Vec<PathBuf> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl IndexBuilder for FakeIndexer {
    async fn ingest(
        &self,
        source: &Path,
        _index_path: &Path,
        progress: &(dyn Fn(u64, u64) + Send + Sync),
    ) -> std::result::Result<u64, IndexError> {
        self.sources.lock().unwrap().push(source.to_path_buf());
        progress(self.documents, self.documents);
        Ok(self.documents)
    }

    async fn search(
        &self,
        _index_path: &Path,
        query: &str,
        _limit: usize,
    ) -> std::result::Result<Vec<SearchHit>, IndexError> {
        Ok(vec![SearchHit {
            id: "doc-1".to_string(),
            title: "Fake".to_string(),
            timestamp: String::new(),
            snippet: format!("[{query}]"),
        }])
    }
}

async fn manager_with(
    dir: &Path,
    fetcher: Arc<ScriptedFetcher>,
    indexer: Arc<dyn IndexBuilder>,
) -> JobManager {
    JobManager::with_components(test_config(dir), fetcher, indexer)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

/// Collect events until `done` matches one; returns everything seen, including the match
async fn wait_for_event(
    rx: &mut broadcast::Receiver<Event>,
    mut done: impl FnMut(&Event) -> bool,
) -> Vec<Event> {
    let mut seen = Vec::new();
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let finished = done(&event);
                    seen.push(event);
                    if finished {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event");
    seen
}

fn is_finished(event: &Event) -> bool {
    matches!(event, Event::Completed { .. } | Event::Failed { .. })
}

async fn wait_for_stage(manager: &JobManager, id: &JobId, stage: Stage) -> JobInfo {
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            if let Some(info) = manager.get_job(id).await
                && info.stage == stage
            {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("job {id} never reached {stage}"))
}

fn is_active(manager: &JobManager, id: &JobId) -> bool {
    manager.workers.active.lock().unwrap().contains_key(id)
}
