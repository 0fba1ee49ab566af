// src/merge.rs

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("chunk {index} ({}): {source}", path.display())]
    Chunk {
        index: usize,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("output file: {0}")]
    Output(#[from] std::io::Error),
}

impl MergeError {
    /// Index of the chunk that broke the merge, if a chunk was at fault.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            MergeError::Chunk { index, .. } => Some(*index),
            MergeError::Output(_) => None,
        }
    }
}

/// Concatenates chunk files, in the order given, into `output`.
///
/// `output` is truncated first. On error the partial output is left in place.
/// Returns the number of bytes written.
pub async fn merge_chunks<P: AsRef<Path>>(chunks: &[P], output: &Path) -> Result<u64, MergeError> {
    let out = File::create(output).await?;
    let mut writer = BufWriter::with_capacity(512 * 1024, out);
    let mut total = 0u64;

    for (index, chunk) in chunks.iter().enumerate() {
        let path = chunk.as_ref();
        let chunk_err = |source| MergeError::Chunk {
            index,
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).await.map_err(chunk_err)?;
        let mut reader = BufReader::with_capacity(512 * 1024, file);
        let copied = tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(chunk_err)?;
        debug!(index, copied, "merged chunk {}", path.display());
        total += copied;
    }

    writer.flush().await?;
    writer.get_mut().sync_all().await?;
    info!(total, "merged {} chunks into {}", chunks.len(), output.display());
    Ok(total)
}

/// Deletes chunk files after a successful merge. Missing files are ignored.
pub async fn remove_chunks<P: AsRef<Path>>(chunks: &[P]) -> std::io::Result<()> {
    for chunk in chunks {
        match tokio::fs::remove_file(chunk.as_ref()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
