// src/probe.rs

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::downloader::{content_length, send_following, DownloadError};
use crate::models::Probe;
use crate::request::RequestTemplate;

/// Classifies URLs as range-capable or whole-file.
///
/// The check asks for the first tenth of the resource and accepts only a
/// `206` answer of exactly that many bytes, which rejects servers that ignore
/// the `Range` header or truncate instead of honouring it.
pub struct RangeProber<'a> {
    client: &'a Client,
    template: &'a RequestTemplate,
    follow_redirects: bool,
    timeout: Option<Duration>,
}

impl<'a> RangeProber<'a> {
    pub fn new(client: &'a Client, template: &'a RequestTemplate, follow_redirects: bool) -> Self {
        Self {
            client,
            template,
            follow_redirects,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Never fails: any error degrades the URL to [`Probe::WholeFile`].
    pub async fn probe(&self, url: &str) -> Probe {
        match self.try_probe(url).await {
            Ok(probe) => {
                info!(url, ?probe, "probed");
                probe
            }
            Err(e) => {
                debug!(url, "probe failed, treating as whole file: {}", e);
                Probe::WholeFile
            }
        }
    }

    async fn try_probe(&self, url: &str) -> Result<Probe, DownloadError> {
        let full = self.send(url, None).await?;
        if !full.status().is_success() {
            return Err(DownloadError::Status(full.status()));
        }
        let Some(total) = content_length(&full) else {
            return Ok(Probe::WholeFile);
        };
        drop(full);

        let ten_percent = total / 10;
        let header = format!("bytes=0-{}", ten_percent);
        let partial = self.send(url, Some(&header)).await?;
        let status = partial.status();
        let got = content_length(&partial);
        debug!(url, total, %status, ?got, expected = ten_percent + 1, "range probe");

        // A tiny resource sent whole has the right length too; only 206 counts.
        Ok(match got {
            Some(len) if status == StatusCode::PARTIAL_CONTENT && len == ten_percent + 1 => {
                Probe::RangeCapable { size: total }
            }
            _ => Probe::WholeFile,
        })
    }

    async fn send(&self, url: &str, range: Option<&str>) -> Result<reqwest::Response, DownloadError> {
        send_following(
            self.client,
            self.template,
            url,
            range,
            self.follow_redirects,
            self.timeout,
        )
        .await
    }
}
