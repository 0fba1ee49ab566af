// src/main.rs

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tget::prelude::*;
use tracing_subscriber::EnvFilter;

/// Local file name for a URL: its last path segment, or a fallback.
fn output_name(url: &str) -> PathBuf {
    let name = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "index.html".to_string());
    PathBuf::from(name)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        bail!("usage: tget <url>...   (settings from $TGET_CONFIG, a JSON file)");
    }

    let config = match std::env::var_os("TGET_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            SessionConfig::load(&path)
                .await
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => SessionConfig::default(),
    };

    let manager = DownloadManager::new(config)?;
    let cancel = manager.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let requests = urls
        .into_iter()
        .map(|url| {
            let output = output_name(&url);
            DownloadRequest::new(url, output)
        })
        .collect();

    let mut failures = 0;
    for report in manager.run(requests).await? {
        match report.result {
            Ok(bytes) => println!("{} -> {} ({} bytes)", report.target.url, report.target.output.display(), bytes),
            Err(e) => {
                failures += 1;
                eprintln!("{} failed: {}", report.target.url, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} download(s) failed", failures);
    }
    Ok(())
}
