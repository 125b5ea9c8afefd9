//! Resumable, streaming fetcher for remote listing documents
//!
//! A listing is pulled in byte-range windows of `chunk_size` bytes. Servers
//! that honour ranges answer `206` and the window advances until the total
//! from `Content-Range` is reached; servers that ignore ranges answer `200`
//! with the whole body, which is taken as the complete payload. Either way the
//! body is streamed through a [`StreamingDecoder`] into a temp file that is
//! renamed over the destination only once the transfer finished, so a failed
//! fetch never damages the previous download.
//!
//! Only one fetch per listing may run at a time; a second concurrent fetch of
//! the same listing is rejected with [`FetchError::AlreadyInProgress`].

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_RANGE, LAST_MODIFIED, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::{AppError, AppResult, FetchError, FetchResult};
use crate::models::{FetchOutcome, ListingSource};
use crate::utils::decompression::StreamingDecoder;
use crate::utils::http::{is_gzip_encoding, parse_content_range, parse_http_date, range_header};

/// Default range window
pub const DEFAULT_CHUNK_SIZE: u64 = 256 * 1024;
/// Default deadline for a response or the next body chunk
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Tunables for [`RemoteDocumentFetcher`]
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub chunk_size: u64,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
            user_agent: format!("skyq-epg/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Claim on a listing key, released on drop
struct InFlight {
    keys: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.remove(&self.key);
    }
}

/// Running totals for one transfer
#[derive(Default)]
struct TransferProgress {
    received: u64,
    written: u64,
}

pub struct RemoteDocumentFetcher {
    client: Client,
    options: FetchOptions,
    in_flight: Arc<Mutex<HashSet<String>>>,
    abort: CancellationToken,
}

impl RemoteDocumentFetcher {
    /// Create a fetcher whose transfers stop when `abort` is cancelled
    pub fn new(options: FetchOptions, abort: CancellationToken) -> AppResult<Self> {
        if options.chunk_size == 0 {
            return Err(AppError::configuration("fetch chunk size must be positive"));
        }

        // No client-level timeout: the deadline applies per response and per
        // chunk, not to the whole (possibly very long) transfer.
        let client = Client::builder()
            .user_agent(options.user_agent.clone())
            .connect_timeout(options.timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            options,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            abort,
        })
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Download `listing` into its local path
    pub async fn fetch(&self, listing: &ListingSource) -> FetchResult<FetchOutcome> {
        let url = listing.url().as_str();
        let _claim = self.claim(listing)?;
        if !listing.begin_download().await {
            return Err(FetchError::AlreadyInProgress {
                url: url.to_string(),
            });
        }

        info!("Fetching listing {}", url);
        let tmp = listing.temp_path();
        let result = self.transfer(listing, &tmp).await;

        match &result {
            Ok(outcome) => {
                listing.complete_download(outcome.last_modified).await;
                info!(
                    "Fetched {} in {} request(s): {} bytes received, {} bytes written{}",
                    url,
                    outcome.requests,
                    outcome.bytes_received,
                    outcome.bytes_written,
                    if outcome.decompressed { " (gunzipped)" } else { "" }
                );
            }
            Err(e) => {
                listing.abort_download().await;
                if let Err(rm) = fs::remove_file(&tmp).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial download {}: {}", tmp.display(), rm);
                    }
                }
                warn!("Fetch of {} failed: {}", url, e);
            }
        }
        result
    }

    fn claim(&self, listing: &ListingSource) -> FetchResult<InFlight> {
        let mut keys = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.insert(listing.key().to_string()) {
            return Err(FetchError::AlreadyInProgress {
                url: listing.url().to_string(),
            });
        }
        Ok(InFlight {
            keys: Arc::clone(&self.in_flight),
            key: listing.key().to_string(),
        })
    }

    async fn transfer(&self, listing: &ListingSource, tmp: &Path) -> FetchResult<FetchOutcome> {
        let url = listing.url().as_str();
        let chunk_size = self.options.chunk_size;

        fs::create_dir_all(listing.cache_dir()).await?;
        let mut file = File::create(tmp).await?;

        let mut decoder: Option<StreamingDecoder> = None;
        let mut progress = TransferProgress::default();
        let mut last_modified = None;
        let mut requests = 0u32;
        let mut start = 0u64;
        let mut total: Option<u64> = None;

        loop {
            let end = start + chunk_size - 1;
            let response = self.request_range(url, start, end).await?;
            requests += 1;
            let status = response.status();
            trace!("{} bytes={}-{} -> {}", url, start, end, status);

            if let Some(value) = header_str(&response, LAST_MODIFIED) {
                match parse_http_date(value) {
                    Some(dt) => last_modified = Some(dt),
                    None => debug!("Ignoring unparseable Last-Modified '{}' from {}", value, url),
                }
            }
            let declared_gzip = header_str(&response, CONTENT_ENCODING).is_some_and(is_gzip_encoding);

            match status {
                StatusCode::RANGE_NOT_SATISFIABLE => {
                    return Err(FetchError::RangeNotSatisfiable {
                        url: url.to_string(),
                        start,
                        end,
                    });
                }
                StatusCode::PARTIAL_CONTENT => {
                    let range = header_str(&response, CONTENT_RANGE)
                        .and_then(parse_content_range)
                        .ok_or_else(|| {
                            FetchError::status(url, 206, "partial response without a valid Content-Range")
                        })?;
                    if range.start != start {
                        return Err(FetchError::status(
                            url,
                            206,
                            format!("asked for bytes from {start}, server sent from {}", range.start),
                        ));
                    }
                    if total.is_none() {
                        total = range.total;
                    }

                    let decoder = decoder.get_or_insert_with(|| StreamingDecoder::new(declared_gzip));
                    let before = progress.received;
                    self.stream_body(url, response, decoder, &mut file, &mut progress)
                        .await?;
                    let received = progress.received - before;
                    start += received;

                    let done = match total {
                        Some(total) => start >= total,
                        None => received < chunk_size,
                    };
                    if done {
                        break;
                    }
                    if received == 0 {
                        return Err(FetchError::status(
                            url,
                            206,
                            format!("empty partial response at byte {start}"),
                        ));
                    }
                }
                StatusCode::OK => {
                    if start > 0 {
                        // Server stopped honouring ranges mid-transfer; start over from the full body
                        warn!("{} ignored range request at byte {}; restarting from full body", url, start);
                        file.set_len(0).await?;
                        file.seek(SeekFrom::Start(0)).await?;
                        progress = TransferProgress::default();
                    }
                    let decoder = decoder.insert(StreamingDecoder::new(declared_gzip));
                    self.stream_body(url, response, decoder, &mut file, &mut progress)
                        .await?;
                    break;
                }
                other => {
                    return Err(FetchError::status(
                        url,
                        other.as_u16(),
                        format!("HTTP {other}"),
                    ));
                }
            }
        }

        let decompressed = decoder.as_ref().is_some_and(StreamingDecoder::is_decompressing);
        if let Some(decoder) = decoder {
            let tail = decoder.finish().map_err(|e| FetchError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            file.write_all(&tail).await?;
            progress.written += tail.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(tmp, listing.local_path()).await?;

        Ok(FetchOutcome {
            local_path: listing.local_path().to_path_buf(),
            last_modified,
            bytes_received: progress.received,
            bytes_written: progress.written,
            requests,
            decompressed,
        })
    }

    async fn request_range(&self, url: &str, start: u64, end: u64) -> FetchResult<Response> {
        let request = self
            .client
            .get(url)
            .header(RANGE, range_header(start, end))
            .header(ACCEPT_ENCODING, "gzip")
            .send();

        tokio::select! {
            _ = self.abort.cancelled() => Err(FetchError::Cancelled { url: url.to_string() }),
            sent = tokio::time::timeout(self.options.timeout, request) => match sent {
                Err(_) => Err(FetchError::timeout(url, self.options.timeout)),
                Ok(Err(e)) if e.is_timeout() => Err(FetchError::timeout(url, self.options.timeout)),
                Ok(Err(e)) => Err(FetchError::from_reqwest(url, e)),
                Ok(Ok(response)) => Ok(response),
            },
        }
    }

    /// Pipe one response body through the decoder into `file`
    async fn stream_body(
        &self,
        url: &str,
        response: Response,
        decoder: &mut StreamingDecoder,
        file: &mut File,
        progress: &mut TransferProgress,
    ) -> FetchResult<()> {
        let mut body = response.bytes_stream();

        loop {
            let next = tokio::select! {
                _ = self.abort.cancelled() => {
                    return Err(FetchError::Cancelled { url: url.to_string() });
                }
                next = tokio::time::timeout(self.options.timeout, body.next()) => next,
            };

            let chunk: Bytes = match next {
                Err(_) => return Err(FetchError::timeout(url, self.options.timeout)),
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => return Err(FetchError::from_reqwest(url, e)),
                Ok(Some(Ok(chunk))) => chunk,
            };

            progress.received += chunk.len() as u64;
            let plain = decoder.feed(&chunk).map_err(|e| FetchError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            file.write_all(&plain).await?;
            progress.written += plain.len() as u64;
        }
    }
}

fn header_str(response: &Response, name: reqwest::header::HeaderName) -> Option<&str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
