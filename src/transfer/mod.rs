//! Resumable chunked archive transfer
//!
//! [`DownloadTransfer`] appends a remote resource to a local file, starting
//! from however many bytes are already on disk. Transient failures are retried
//! with backoff, each retry resuming from the current file size. HTTP details
//! live behind the [`RangeFetcher`] trait; [`HttpFetcher`] is the reqwest
//! implementation.

mod http;

pub use http::HttpFetcher;

use crate::config::{DownloadConfig, RetryConfig};
use crate::error::TransferError;
use crate::retry::{Backoff, IsRetryable};
use crate::utils::file_len;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Body of a range request
pub struct RangeBody {
    /// Offset of the first byte in `body`; 0 when the server ignored the range
    pub start: u64,
    /// Full size of the resource, if known
    pub total: Option<u64>,
    /// Body chunks
    pub body: BoxStream<'static, Result<Bytes, TransferError>>,
}

/// Answer to a range request
pub enum RangeResponse {
    /// Bytes follow
    Body(RangeBody),
    /// The requested offset is at or past the end (HTTP 416)
    Exhausted {
        /// Full size reported alongside the refusal, if any
        total: Option<u64>,
    },
}

/// Source of byte ranges
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Request the resource starting at `offset`
    async fn fetch(&self, url: &str, offset: u64) -> Result<RangeResponse, TransferError>;
}

/// Progress reported by [`DownloadTransfer::transfer`]
#[derive(Clone, Debug, PartialEq)]
pub enum TransferProgress {
    /// Bytes on disk after a chunk was written
    Bytes {
        /// Bytes on disk
        downloaded: u64,
        /// Full size, if known
        total: Option<u64>,
    },
    /// A transient failure is about to be retried
    Retrying {
        /// Retry number (1-based)
        attempt: u32,
        /// The failure being retried
        error: String,
    },
}

/// How a transfer ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The file holds the whole resource
    Completed {
        /// Final file size
        bytes: u64,
    },
    /// Cancellation was requested; the partial file is intact
    Cancelled {
        /// Bytes on disk
        bytes: u64,
    },
}

/// Resumable, retried, chunked downloader
#[derive(Clone)]
pub struct DownloadTransfer {
    fetcher: Arc<dyn RangeFetcher>,
    retry: RetryConfig,
    chunk_size: usize,
    read_timeout: Duration,
}

impl DownloadTransfer {
    /// Create a transfer engine on top of a fetcher
    pub fn new(fetcher: Arc<dyn RangeFetcher>, download: &DownloadConfig, retry: RetryConfig) -> Self {
        Self {
            fetcher,
            retry,
            chunk_size: download.chunk_size.max(1),
            read_timeout: download.read_timeout,
        }
    }

    /// Fetch `url` into `destination`, resuming from the bytes already there
    ///
    /// `progress` is called after every chunk written and before every retry.
    /// Permanent failures and exhausted retries return the last error; a
    /// cancellation between chunks returns [`TransferOutcome::Cancelled`].
    pub async fn transfer<P>(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        mut progress: P,
    ) -> Result<TransferOutcome, TransferError>
    where
        P: FnMut(TransferProgress) + Send,
    {
        let mut backoff = Backoff::new(&self.retry);

        loop {
            let error = match self.attempt(url, destination, cancel, &mut progress).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::warn!(url, error = %error, "transfer failed permanently");
                return Err(error);
            }
            let Some(delay) = backoff.next_delay() else {
                tracing::error!(
                    url,
                    error = %error,
                    retries = backoff.retries(),
                    "transfer failed after all retries"
                );
                return Err(error);
            };

            tracing::warn!(
                url,
                error = %error,
                attempt = backoff.retries(),
                delay_ms = delay.as_millis() as u64,
                "transfer interrupted, retrying"
            );
            progress(TransferProgress::Retrying {
                attempt: backoff.retries(),
                error: error.to_string(),
            });

            tokio::select! {
                _ = cancel.cancelled() => {
                    let bytes = file_len(destination).await?.unwrap_or(0);
                    return Ok(TransferOutcome::Cancelled { bytes });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One range request, appended to the destination
    async fn attempt<P>(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        progress: &mut P,
    ) -> Result<TransferOutcome, TransferError>
    where
        P: FnMut(TransferProgress) + Send,
    {
        let offset = file_len(destination).await?.unwrap_or(0);
        if cancel.is_cancelled() {
            return Ok(TransferOutcome::Cancelled { bytes: offset });
        }

        tracing::debug!(url, offset, "requesting range");
        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(TransferOutcome::Cancelled { bytes: offset }),
            response = self.fetcher.fetch(url, offset) => response?,
        };

        let RangeBody {
            start,
            total,
            mut body,
        } = match response {
            RangeResponse::Body(body) => body,
            RangeResponse::Exhausted { total } => return exhausted(offset, total),
        };

        if let Some(total) = total
            && offset > total
        {
            return Err(TransferError::SizeMismatch {
                expected: total,
                actual: offset,
            });
        }
        if start > offset {
            return Err(TransferError::InvalidResponse(format!(
                "server resumed at byte {start}, expected {offset}"
            )));
        }
        // A server that ignores the range resends bytes we already hold
        let mut skip = offset - start;
        if skip > 0 {
            tracing::debug!(url, skip, "server ignored range request, skipping held bytes");
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(destination)
            .await?;

        let mut written = offset;
        let mut pending: Vec<u8> = Vec::with_capacity(self.chunk_size);
        progress(TransferProgress::Bytes {
            downloaded: written,
            total,
        });

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    written += flush_pending(&mut file, &mut pending).await?;
                    report(progress, written, total);
                    tracing::debug!(url, written, "transfer cancelled");
                    return Ok(TransferOutcome::Cancelled { bytes: written });
                }
                next = tokio::time::timeout(self.read_timeout, body.next()) => next,
            };

            let chunk = match next {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    written += flush_pending(&mut file, &mut pending).await?;
                    report(progress, written, total);
                    return Err(e);
                }
                Err(_) => {
                    written += flush_pending(&mut file, &mut pending).await?;
                    report(progress, written, total);
                    return Err(TransferError::Connection(format!(
                        "no data received for {}s",
                        self.read_timeout.as_secs()
                    )));
                }
            };

            let mut chunk = &chunk[..];
            if skip > 0 {
                let n = skip.min(chunk.len() as u64) as usize;
                chunk = &chunk[n..];
                skip -= n as u64;
            }
            if chunk.is_empty() {
                continue;
            }

            let received = written + (pending.len() + chunk.len()) as u64;
            if let Some(total) = total
                && received > total
            {
                flush_pending(&mut file, &mut pending).await?;
                return Err(TransferError::SizeMismatch {
                    expected: total,
                    actual: received,
                });
            }

            pending.extend_from_slice(chunk);
            while pending.len() >= self.chunk_size {
                let rest = pending.split_off(self.chunk_size);
                written += flush_pending(&mut file, &mut pending).await?;
                pending = rest;
                report(progress, written, total);
            }
        }

        if !pending.is_empty() {
            written += flush_pending(&mut file, &mut pending).await?;
            report(progress, written, total);
        }
        file.sync_data().await?;

        if skip > 0 {
            return Err(TransferError::Incomplete {
                received: offset - skip,
                expected: offset,
            });
        }
        match total {
            Some(total) if written < total => Err(TransferError::Incomplete {
                received: written,
                expected: total,
            }),
            _ => {
                tracing::debug!(url, bytes = written, "transfer complete");
                Ok(TransferOutcome::Completed { bytes: written })
            }
        }
    }
}

fn exhausted(offset: u64, total: Option<u64>) -> Result<TransferOutcome, TransferError> {
    match total {
        Some(total) if total == offset => Ok(TransferOutcome::Completed { bytes: offset }),
        Some(total) => Err(TransferError::SizeMismatch {
            expected: total,
            actual: offset,
        }),
        None => Err(TransferError::InvalidResponse(format!(
            "range starting at byte {offset} not satisfiable"
        ))),
    }
}

async fn flush_pending(file: &mut tokio::fs::File, pending: &mut Vec<u8>) -> std::io::Result<u64> {
    if pending.is_empty() {
        return Ok(0);
    }
    file.write_all(pending).await?;
    file.flush().await?;
    let n = pending.len() as u64;
    pending.clear();
    Ok(n)
}

fn report<P>(progress: &mut P, downloaded: u64, total: Option<u64>)
where
    P: FnMut(TransferProgress),
{
    progress(TransferProgress::Bytes { downloaded, total });
}
