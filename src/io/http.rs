use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ReadAt, clamp_len};
use crate::error::{Error, Result};

/// Transport settings for [`HttpRangeReader`]
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Upper bound for a single request, connect to last body byte
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP Range reader for a remote archive.
///
/// Every `read_at` issues exactly one `GET` with a `Range` header. Failed,
/// mismatched or short responses are errors; nothing is retried.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    cancel: CancellationToken,
    transferred_bytes: AtomicU64,
    requests: AtomicU64,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// This sends a `bytes=0-0` probe to verify Range support and learn the
    /// total size from the `Content-Range` header.
    pub async fn connect(url: String, options: &HttpOptions, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.as_str())
            .build()?;

        let reader = Self {
            client,
            url,
            size: 0,
            cancel,
            transferred_bytes: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        };

        let resp = reader
            .cancellable(reader.client.get(&reader.url).header(RANGE, "bytes=0-0").send())
            .await??;
        reader.requests.fetch_add(1, Ordering::Relaxed);

        match resp.status() {
            StatusCode::PARTIAL_CONTENT => {}
            // The server ignored the Range header and is streaming the whole body
            StatusCode::OK => return Err(Error::RangeNotSupported),
            status => {
                return Err(Error::UnexpectedStatus {
                    url: reader.url.clone(),
                    status,
                });
            }
        }

        let header = content_range_header(&resp)?;
        let range = ContentRange::parse(&header).ok_or_else(|| Error::InvalidContentRange(header.clone()))?;
        let size = range.total.ok_or(Error::InvalidContentRange(header))?;
        debug!(url = %reader.url, size, "remote resource supports ranges");

        Ok(Self { size, ..reader })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Number of HTTP requests issued, including the size probe
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn cancellable<T>(&self, fut: impl Future<Output = T>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            out = fut => Ok(out),
        }
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = clamp_len(offset, buf.len(), self.size)?;
        if len == 0 {
            return Ok(0);
        }

        let end = offset + len as u64 - 1;
        let range = format!("bytes={}-{}", offset, end);
        debug!(%range, "fetching");

        let resp = self
            .cancellable(self.client.get(&self.url).header(RANGE, &range).send())
            .await??;
        self.requests.fetch_add(1, Ordering::Relaxed);

        if resp.status() != StatusCode::PARTIAL_CONTENT {
            return Err(Error::UnexpectedStatus {
                url: self.url.clone(),
                status: resp.status(),
            });
        }

        let header = content_range_header(&resp)?;
        let served = ContentRange::parse(&header).ok_or_else(|| Error::InvalidContentRange(header.clone()))?;
        // The resource must not have changed size since the probe
        if served.start != offset || served.end != end || served.total != Some(self.size) {
            return Err(Error::InvalidContentRange(header));
        }

        let bytes = self.cancellable(resp.bytes()).await??;
        self.transferred_bytes
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);

        if bytes.len() != len {
            return Err(Error::ShortRead {
                offset,
                expected: len as u64,
                actual: bytes.len() as u64,
            });
        }

        buf[..len].copy_from_slice(&bytes);
        Ok(len)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

fn content_range_header(resp: &reqwest::Response) -> Result<String> {
    resp.headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidContentRange(String::new()))
}

/// Parsed `Content-Range: bytes <start>-<end>/<total>` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContentRange {
    start: u64,
    end: u64,
    /// `None` when the server answers with `*`
    total: Option<u64>,
}

impl ContentRange {
    fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;
        let (start, end) = span.split_once('-')?;
        let start = start.trim().parse().ok()?;
        let end = end.trim().parse().ok()?;
        if end < start {
            return None;
        }
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse().ok()?),
        };
        Some(Self { start, end, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_range() {
        assert_eq!(
            ContentRange::parse("bytes 0-0/1234"),
            Some(ContentRange {
                start: 0,
                end: 0,
                total: Some(1234)
            })
        );
        assert_eq!(
            ContentRange::parse("bytes 100-199/*"),
            Some(ContentRange {
                start: 100,
                end: 199,
                total: None
            })
        );
    }

    #[test]
    fn rejects_malformed_content_range() {
        assert_eq!(ContentRange::parse("items 0-1/2"), None);
        assert_eq!(ContentRange::parse("bytes 5-1/10"), None);
        assert_eq!(ContentRange::parse("bytes 0-1"), None);
        assert_eq!(ContentRange::parse("bytes */10"), None);
    }
}
