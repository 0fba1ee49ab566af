// src/manager.rs

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alloc::{unique_path, AllocError};
use crate::client::build_clients;
use crate::config::{ConfigError, SessionConfig};
use crate::downloader::{ChunkDownloader, DownloadError, DownloadOptions};
use crate::merge::{merge_chunks, remove_chunks, MergeError};
use crate::models::{ChunkJob, DownloadTarget, Probe};
use crate::planner::{distribute_batches, plan_chunks};
use crate::probe::RangeProber;
use crate::progress::{NoProgress, ProgressSink};
use crate::request::RequestTemplate;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no HTTP clients available")]
    NoClients,
    #[error("client construction failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("filename allocation failed: {0}")]
    Alloc(#[from] AllocError),
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("chunks {0:?} did not complete")]
    ChunksFailed(Vec<usize>),
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hands out a progress sink for every attempt of every chunk job.
pub trait ProgressFactory: Send + Sync {
    fn sink(&self, job: &ChunkJob) -> Arc<dyn ProgressSink>;
}

impl ProgressFactory for NoProgress {
    fn sink(&self, _job: &ChunkJob) -> Arc<dyn ProgressSink> {
        Arc::new(NoProgress)
    }
}

impl<F> ProgressFactory for F
where
    F: Fn(&ChunkJob) -> Arc<dyn ProgressSink> + Send + Sync,
{
    fn sink(&self, job: &ChunkJob) -> Arc<dyn ProgressSink> {
        self(job)
    }
}

/// A URL the caller wants saved at `output`.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub output: PathBuf,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output: output.into(),
        }
    }
}

/// What happened to one requested URL.
#[derive(Debug)]
pub struct TargetReport {
    pub target: DownloadTarget,
    /// Bytes in the final file, or why it could not be produced.
    pub result: Result<u64, ManagerError>,
}

/// Drives a whole session: probe every URL, split range-capable resources
/// across all clients, batch the rest, then merge.
pub struct DownloadManager {
    clients: Vec<Client>,
    template: Arc<RequestTemplate>,
    config: SessionConfig,
    progress: Arc<dyn ProgressFactory>,
    cancel: CancellationToken,
}

impl DownloadManager {
    /// Builds one client per configured egress point.
    pub fn new(config: SessionConfig) -> Result<Self, ManagerError> {
        let clients = build_clients(&config.client)?;
        Self::with_clients(config, clients)
    }

    pub fn with_clients(config: SessionConfig, clients: Vec<Client>) -> Result<Self, ManagerError> {
        if clients.is_empty() {
            return Err(ManagerError::NoClients);
        }
        let template = config.request.template().map_err(ConfigError::from)?;
        Ok(Self {
            clients,
            template: Arc::new(template),
            config,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressFactory>) -> Self {
        self.progress = progress;
        self
    }

    /// Token that aborts every running chunk job when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn options(&self) -> DownloadOptions {
        DownloadOptions {
            follow_redirects: self.config.follow_redirects,
            resume: self.config.resume,
            overwrite: self.config.overwrite,
            timeout: self.config.timeout(),
            cancel: self.cancel.clone(),
        }
    }

    /// Runs every request to a terminal state. Reports come back in request order.
    pub async fn run(&self, requests: Vec<DownloadRequest>) -> Result<Vec<TargetReport>, ManagerError> {
        let targets = self.prepare(requests).await?;
        let mut reports: Vec<Option<TargetReport>> = targets.iter().map(|_| None).collect();

        let mut whole = Vec::new();
        for (position, target) in targets.into_iter().enumerate() {
            match target.probe {
                Probe::RangeCapable { size } => {
                    let result = self.download_split(&target, size).await;
                    reports[position] = Some(TargetReport { target, result });
                }
                Probe::WholeFile => whole.push((position, target)),
            }
        }

        for (position, report) in self.download_batches(whole).await {
            reports[position] = Some(report);
        }

        Ok(reports.into_iter().flatten().collect())
    }

    /// Probes each URL and settles its output path.
    async fn prepare(&self, requests: Vec<DownloadRequest>) -> Result<Vec<DownloadTarget>, ManagerError> {
        let prober = RangeProber::new(&self.clients[0], &self.template, self.config.follow_redirects)
            .with_timeout(self.config.timeout());

        let mut targets = Vec::with_capacity(requests.len());
        for request in requests {
            // A fresh run never clobbers an existing file; resume and overwrite reuse the path.
            let output = if self.config.resume || self.config.overwrite {
                request.output
            } else {
                unique_path(&request.output)?
            };
            let probe = prober.probe(&request.url).await;
            targets.push(DownloadTarget::new(request.url, output, probe));
        }
        Ok(targets)
    }

    /// One chunk per client, all in parallel, then merged in range order.
    async fn download_split(&self, target: &DownloadTarget, size: u64) -> Result<u64, ManagerError> {
        let ranges = plan_chunks(size, self.clients.len());
        info!(url = %target.url, size, chunks = ranges.len(), "downloading in chunks");

        let mut set = JoinSet::new();
        let mut paths = Vec::with_capacity(ranges.len());
        for ((index, range), client) in ranges.into_iter().enumerate().zip(&self.clients) {
            let job = ChunkJob::ranged(target.clone(), index, range, client.clone());
            paths.push(job.path.clone());
            let worker = Worker {
                downloader: ChunkDownloader::new(self.template.clone(), self.options()),
                progress: self.progress.clone(),
                retries: self.config.retries,
            };
            set.spawn(async move { (index, worker.run(job).await) });
        }

        let mut failed = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (index, result) = joined?;
            if result.is_err() {
                failed.push(index);
            }
        }
        if !failed.is_empty() {
            failed.sort_unstable();
            return Err(ManagerError::ChunksFailed(failed));
        }

        let total = merge_chunks(&paths, &target.output).await?;
        if self.config.remove_chunks {
            if let Err(e) = remove_chunks(&paths).await {
                warn!("could not remove chunk files for {}: {}", target.output.display(), e);
            }
        }
        Ok(total)
    }

    /// Whole-file targets split into one batch per client; batches run in
    /// parallel, each one sequentially on its own client.
    async fn download_batches(&self, whole: Vec<(usize, DownloadTarget)>) -> Vec<(usize, TargetReport)> {
        if whole.is_empty() {
            return Vec::new();
        }
        let workers = self.clients.len().min(whole.len());
        let batches = distribute_batches(whole, workers);

        let mut set = JoinSet::new();
        for (batch, client) in batches.into_iter().zip(&self.clients) {
            let worker = Worker {
                downloader: ChunkDownloader::new(self.template.clone(), self.options()),
                progress: self.progress.clone(),
                retries: self.config.retries,
            };
            let client = client.clone();
            set.spawn(async move {
                let mut reports = Vec::with_capacity(batch.len());
                for (position, target) in batch {
                    let job = ChunkJob::whole(target.clone(), client.clone());
                    let result = worker.run(job).await.map_err(ManagerError::from);
                    reports.push((position, TargetReport { target, result }));
                }
                reports
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(batch) => reports.extend(batch),
                Err(e) => warn!("batch worker failed: {}", e),
            }
        }
        reports
    }
}

/// Runs one job with the caller-level retry policy.
struct Worker {
    downloader: ChunkDownloader,
    progress: Arc<dyn ProgressFactory>,
    retries: u32,
}

impl Worker {
    async fn run(&self, job: ChunkJob) -> Result<u64, DownloadError> {
        let mut downloader = self.downloader.clone();
        let mut attempts = 0;
        loop {
            let sink = self.progress.sink(&job);
            match downloader.run(&job, sink.as_ref()).await {
                Ok(written) => return Ok(written),
                Err(e) => {
                    attempts += 1;
                    if attempts > self.retries || !retryable(&e) {
                        return Err(e);
                    }
                    warn!(url = job.url(), chunk = job.index, attempts, "retrying: {}", e);
                    // Later attempts build on what earlier ones wrote.
                    let mut options = downloader.options().clone();
                    options.resume = true;
                    options.overwrite = false;
                    downloader = downloader.with_options(options);
                }
            }
        }
    }
}

fn retryable(e: &DownloadError) -> bool {
    !matches!(
        e,
        DownloadError::Cancelled | DownloadError::RedirectDisabled(_) | DownloadError::RangeIgnored(_)
    )
}
