use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, LOCATION};
use reqwest::{Client, Response, StatusCode, Url};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter, SeekFrom};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::ChunkJob;
use crate::progress::ProgressSink;
use crate::request::RequestTemplate;

/// Upper bound on consecutive redirects followed for one request.
pub const MAX_REDIRECTS: usize = 10;

/// Custom errors for download operations.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server answered {0}")]
    Status(StatusCode),
    #[error("redirect from {0} but following redirects is disabled")]
    RedirectDisabled(String),
    #[error("unusable redirect from {url}: {reason}")]
    Redirect { url: String, reason: String },
    #[error("more than {MAX_REDIRECTS} redirects")]
    TooManyRedirects,
    #[error("range request answered with {0} instead of 206")]
    RangeIgnored(StatusCode),
    #[error("body ended after {got} of {expected} bytes")]
    Incomplete { expected: u64, got: u64 },
    #[error("download cancelled")]
    Cancelled,
}

/// Per-run switches shared by every chunk job.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub follow_redirects: bool,
    /// Continue from the bytes already on disk.
    pub resume: bool,
    /// Start from scratch even if bytes are on disk. Wins over `resume`.
    pub overwrite: bool,
    /// Deadline for each request, body included.
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

/// Fetches one [`ChunkJob`] into its file.
#[derive(Debug, Clone)]
pub struct ChunkDownloader {
    template: Arc<RequestTemplate>,
    options: DownloadOptions,
}

impl ChunkDownloader {
    pub fn new(template: Arc<RequestTemplate>, options: DownloadOptions) -> Self {
        Self { template, options }
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Same request template, different switches.
    pub fn with_options(&self, options: DownloadOptions) -> Self {
        Self {
            template: self.template.clone(),
            options,
        }
    }

    /// Runs the job to a terminal state and returns the number of bytes written.
    ///
    /// The sink is always told `complete` or `abort`. On failure whatever was
    /// already written stays on disk so that a later attempt can resume.
    pub async fn run(&self, job: &ChunkJob, sink: &dyn ProgressSink) -> Result<u64, DownloadError> {
        match self.fetch(job, sink).await {
            Ok(written) => {
                sink.complete();
                info!(url = job.url(), chunk = job.index, written, "chunk complete");
                Ok(written)
            }
            Err(e) => {
                sink.abort();
                warn!(url = job.url(), chunk = job.index, "chunk aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn fetch(&self, job: &ChunkJob, sink: &dyn ProgressSink) -> Result<u64, DownloadError> {
        let on_disk = match tokio::fs::metadata(&job.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let mut offset = if self.options.resume && !self.options.overwrite {
            on_disk
        } else {
            0
        };

        let range_header = match job.range {
            Some(range) => match range.header_from(offset) {
                Some(header) => Some(header),
                None => {
                    // Nothing left in this span. Anything past it is not ours.
                    debug!(chunk = job.index, on_disk, span = range.len, "chunk already on disk");
                    open_at(&job.path, range.len).await?;
                    sink.announce_total(Some(0));
                    return Ok(0);
                }
            },
            None if offset > 0 => Some(format!("bytes={}-", offset)),
            None => None,
        };

        let cancel = &self.options.cancel;
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            res = send_following(
                &job.client,
                &self.template,
                job.url(),
                range_header.as_deref(),
                self.options.follow_redirects,
                self.options.timeout,
            ) => res?,
        };
        let status = resp.status();
        debug!(url = job.url(), chunk = job.index, %status, range = ?range_header, "response");

        match (job.range, &range_header) {
            (None, Some(_)) if status == StatusCode::RANGE_NOT_SATISFIABLE => {
                // Resuming a file that is already whole.
                sink.announce_total(Some(0));
                return Ok(0);
            }
            (None, Some(_)) if status == StatusCode::OK => {
                info!(url = job.url(), "server ignored resume request, restarting");
                offset = 0;
            }
            (Some(_), _) if status != StatusCode::PARTIAL_CONTENT => {
                return Err(if status.is_success() {
                    DownloadError::RangeIgnored(status)
                } else {
                    DownloadError::Status(status)
                });
            }
            _ if !status.is_success() => return Err(DownloadError::Status(status)),
            _ => {}
        }

        let file = open_at(&job.path, offset).await?;
        sink.announce_total(content_length(&resp));

        // A ranged chunk never writes past its span, even if the server overshoots.
        let budget = job.range.map(|r| r.len - offset);
        let mut writer = BufWriter::with_capacity(256 * 1024, file);
        let streamed = stream_body(resp, &mut writer, budget, sink, cancel).await;
        // Whatever reached the buffer goes to disk, so a retry resumes after it.
        let flushed = writer.flush().await;
        let written = streamed?;
        flushed?;

        match budget {
            Some(expected) if written < expected => Err(DownloadError::Incomplete {
                expected,
                got: written,
            }),
            _ => Ok(written),
        }
    }
}

/// Copies the response body into `writer`, at most `budget` bytes if given.
///
/// Returns the byte count on success. On error or cancellation the bytes
/// already handed to `writer` have been reported to `sink`.
async fn stream_body(
    resp: Response,
    writer: &mut BufWriter<File>,
    mut budget: Option<u64>,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<u64, DownloadError> {
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let bytes = chunk?;
        let take = match budget {
            Some(left) => (bytes.len() as u64).min(left) as usize,
            None => bytes.len(),
        };
        writer.write_all(&bytes[..take]).await?;
        sink.report_progress(take as u64);
        written += take as u64;
        if let Some(left) = budget.as_mut() {
            *left -= take as u64;
            if *left == 0 {
                break;
            }
        }
    }
    Ok(written)
}

/// Opens `path` for writing at `offset`, creating it if needed and dropping
/// anything stored past `offset`.
async fn open_at(path: &Path, offset: u64) -> Result<File, DownloadError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await?;
    file.set_len(offset).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(file)
}

/// `Content-Length` as sent by the server, `None` if absent or unparseable.
pub(crate) fn content_length(resp: &Response) -> Option<u64> {
    resp.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

fn is_redirect(resp: &Response) -> bool {
    resp.status().is_redirection()
        || resp
            .headers()
            .get(LOCATION)
            .is_some_and(|v| !v.as_bytes().is_empty())
}

fn redirect_target(resp: &Response) -> Result<Url, DownloadError> {
    let bad = |reason: String| DownloadError::Redirect {
        url: resp.url().to_string(),
        reason,
    };
    let raw = resp
        .headers()
        .get(LOCATION)
        .ok_or_else(|| bad("no Location header".to_string()))?
        .to_str()
        .map_err(|e| bad(e.to_string()))?;
    resp.url().join(raw).map_err(|e| bad(e.to_string()))
}

/// Sends a request stamped from `template`, re-issuing it against each
/// redirect target when `follow` is set.
///
/// Clients are built without automatic redirects, so every hop is seen here.
pub(crate) async fn send_following(
    client: &Client,
    template: &RequestTemplate,
    url: &str,
    range: Option<&str>,
    follow: bool,
    timeout: Option<Duration>,
) -> Result<Response, DownloadError> {
    let mut url = url.to_string();
    for _ in 0..=MAX_REDIRECTS {
        let mut rb = template.build(client, &url, range);
        if let Some(timeout) = timeout {
            rb = rb.timeout(timeout);
        }
        let resp = rb.send().await?;
        if !is_redirect(&resp) {
            return Ok(resp);
        }
        if !follow {
            return Err(DownloadError::RedirectDisabled(url));
        }
        let next = redirect_target(&resp)?;
        debug!(from = %url, to = %next, "following redirect");
        url = next.to_string();
    }
    Err(DownloadError::TooManyRedirects)
}
