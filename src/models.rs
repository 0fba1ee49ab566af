// src/models.rs

use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Outcome of probing a URL for byte-range support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Probe {
    /// The origin honours `Range` requests and reported this many bytes.
    RangeCapable { size: u64 },
    /// The resource must be fetched in a single request.
    WholeFile,
}

/// A requested URL after probing. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTarget {
    pub url: String,
    pub output: PathBuf,
    pub probe: Probe,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>, output: impl Into<PathBuf>, probe: Probe) -> Self {
        Self {
            url: url.into(),
            output: output.into(),
            probe,
        }
    }

    pub fn supports_range(&self) -> bool {
        matches!(self.probe, Probe::RangeCapable { .. })
    }

    /// Total size, only known for range-capable targets.
    pub fn total_size(&self) -> Option<u64> {
        match self.probe {
            Probe::RangeCapable { size } => Some(size),
            Probe::WholeFile => None,
        }
    }

    /// Path of the chunk file with the given index, a sibling of the output.
    /// e.g., for "/path/to/file.zip" and index 2 it returns "/path/to/file.zip.part2"
    pub fn chunk_path(&self, index: usize) -> PathBuf {
        chunk_path(&self.output, index)
    }
}

pub fn chunk_path(output: &Path, index: usize) -> PathBuf {
    let output_str = output.to_string_lossy();
    PathBuf::from(format!("{}.part{}", output_str, index))
}

/// A contiguous span of a resource.
///
/// Stored as a start offset and a length so that an empty span (a resource
/// smaller than the number of workers) is representable; `last()` gives the
/// inclusive end used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub len: u64,
}

impl ByteRange {
    /// Builds a range from inclusive bounds; `end` must not precede `start`.
    pub fn inclusive(start: u64, end: u64) -> Self {
        Self {
            start,
            len: end.saturating_sub(start) + 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inclusive end offset, `None` for an empty range.
    pub fn last(&self) -> Option<u64> {
        (self.len > 0).then(|| self.start + self.len - 1)
    }

    /// First offset past this range.
    pub fn end_exclusive(&self) -> u64 {
        self.start + self.len
    }

    /// `Range` header value for the part of this range not yet on disk.
    /// Returns `None` when nothing remains.
    pub fn header_from(&self, already: u64) -> Option<String> {
        if already >= self.len {
            return None;
        }
        let last = self.last()?;
        Some(format!("bytes={}-{}", self.start + already, last))
    }
}

/// One unit of work handed to a [`ChunkDownloader`](crate::downloader::ChunkDownloader).
#[derive(Debug, Clone)]
pub struct ChunkJob {
    pub target: DownloadTarget,
    /// `None` means the whole resource.
    pub range: Option<ByteRange>,
    /// Position of this chunk within its target, used to order the merge.
    pub index: usize,
    pub path: PathBuf,
    pub client: Client,
}

impl ChunkJob {
    pub fn ranged(target: DownloadTarget, index: usize, range: ByteRange, client: Client) -> Self {
        let path = target.chunk_path(index);
        Self {
            target,
            range: Some(range),
            index,
            path,
            client,
        }
    }

    pub fn whole(target: DownloadTarget, client: Client) -> Self {
        let path = target.output.clone();
        Self {
            target,
            range: None,
            index: 0,
            path,
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.target.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusive_range_bounds() {
        let r = ByteRange::inclusive(333, 665);
        assert_eq!(r.len, 333);
        assert_eq!(r.last(), Some(665));
        assert_eq!(r.end_exclusive(), 666);
    }

    #[test]
    fn empty_range_has_no_last_byte() {
        let r = ByteRange { start: 0, len: 0 };
        assert!(r.is_empty());
        assert_eq!(r.last(), None);
        assert_eq!(r.header_from(0), None);
    }

    #[test]
    fn header_accounts_for_bytes_on_disk() {
        let r = ByteRange::inclusive(100, 199);
        assert_eq!(r.header_from(0).as_deref(), Some("bytes=100-199"));
        assert_eq!(r.header_from(40).as_deref(), Some("bytes=140-199"));
        assert_eq!(r.header_from(100), None);
        assert_eq!(r.header_from(150), None);
    }

    #[test]
    fn chunk_paths_are_indexed_siblings() {
        let target = DownloadTarget::new("http://x/a", "/tmp/out.bin", Probe::WholeFile);
        assert_eq!(target.chunk_path(0), PathBuf::from("/tmp/out.bin.part0"));
        assert_eq!(target.chunk_path(12), PathBuf::from("/tmp/out.bin.part12"));
        assert!(!target.supports_range());
        assert_eq!(target.total_size(), None);
    }
}
