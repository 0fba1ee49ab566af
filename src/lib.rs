pub mod alloc;
pub mod client;
pub mod config;
pub mod downloader;
pub mod manager;
pub mod merge;
pub mod models;
pub mod planner;
pub mod probe;
pub mod progress;
pub mod request;

/// Convenient type alias exposing common structs.
pub mod prelude {
    pub use crate::alloc::{free_ports, unique_path, PortReservation};
    pub use crate::client::{build_clients, ClientConfig};
    pub use crate::config::SessionConfig;
    pub use crate::downloader::{ChunkDownloader, DownloadError, DownloadOptions};
    pub use crate::manager::{DownloadManager, DownloadRequest, ProgressFactory, TargetReport};
    pub use crate::merge::merge_chunks;
    pub use crate::models::{ByteRange, ChunkJob, DownloadTarget, Probe};
    pub use crate::planner::{distribute_batches, plan_chunks};
    pub use crate::probe::RangeProber;
    pub use crate::progress::{NoProgress, ProgressCounter, ProgressSink};
    pub use crate::request::RequestTemplate;
}
