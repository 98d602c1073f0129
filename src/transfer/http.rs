//! reqwest-backed [`RangeFetcher`]

use super::{RangeBody, RangeFetcher, RangeResponse};
use crate::config::DownloadConfig;
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, RANGE};

/// Range fetcher over HTTP(S)
///
/// Sends `Range: bytes=<offset>-` for non-zero offsets and interprets
/// `206 Partial Content`, plain `200 OK` (range ignored) and
/// `416 Range Not Satisfiable` responses.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client with the configured timeouts and user agent
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RangeFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, offset: u64) -> std::result::Result<RangeResponse, TransferError> {
        let mut request = self.client.get(url);
        if offset > 0 {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        let response = request.send().await.map_err(classify)?;
        let status = response.status();
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let (start, total) = match status {
            StatusCode::RANGE_NOT_SATISFIABLE => {
                let total = content_range.as_deref().and_then(parse_unsatisfied_range);
                return Ok(RangeResponse::Exhausted { total });
            }
            StatusCode::PARTIAL_CONTENT => match content_range.as_deref() {
                Some(header) => parse_content_range(header).ok_or_else(|| {
                    TransferError::InvalidResponse(format!("unparseable Content-Range {header:?}"))
                })?,
                None => (offset, response.content_length().map(|len| len + offset)),
            },
            s if s.is_success() => (0, response.content_length()),
            s => {
                return Err(TransferError::HttpStatus {
                    status: s.as_u16(),
                    url: url.to_string(),
                });
            }
        };

        let body = response.bytes_stream().map(|chunk| chunk.map_err(classify)).boxed();
        Ok(RangeResponse::Body(RangeBody { start, total, body }))
    }
}

/// Map a reqwest failure onto the transfer taxonomy
fn classify(error: reqwest::Error) -> TransferError {
    if error.is_builder() {
        TransferError::InvalidRequest(error.to_string())
    } else if error.is_redirect() {
        TransferError::InvalidResponse(error.to_string())
    } else {
        // connect, timeout, reset and body errors are all worth another attempt
        TransferError::Connection(error.to_string())
    }
}

/// Parse `bytes <first>-<last>/<total|*>` into (first, total)
fn parse_content_range(header: &str) -> Option<(u64, Option<u64>)> {
    let spec = header.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = spec.split_once('/')?;
    let (first, _last) = range.split_once('-')?;
    let first = first.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    Some((first, total))
}

/// Parse `bytes */<total>` from a 416 response
fn parse_unsatisfied_range(header: &str) -> Option<u64> {
    let spec = header.trim().strip_prefix("bytes")?.trim_start();
    spec.strip_prefix("*/")?.trim().parse().ok()
}
