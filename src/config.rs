// src/config.rs

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientConfig;
use crate::request::{RequestError, RequestTemplate};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid request settings: {0}")]
    Request(#[from] RequestError),
}

/// Request fields applied to every probe and download.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub method: Option<String>,
    /// `"Name: value"` lines.
    pub headers: Vec<String>,
    pub cookie: String,
    pub user_agent: String,
    pub body: String,
}

impl RequestConfig {
    pub fn template(&self) -> Result<RequestTemplate, RequestError> {
        let mut template = RequestTemplate::new();
        if let Some(method) = &self.method {
            template = template.method(method)?;
        }
        Ok(template
            .headers(&self.headers)?
            .cookie(&self.cookie)?
            .user_agent(&self.user_agent)?
            .body(self.body.as_bytes()))
    }
}

/// Settings for one download session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub follow_redirects: bool,
    /// Reuse the output path and its `.partN` files instead of picking a
    /// fresh name when the output already exists.
    pub resume: bool,
    pub overwrite: bool,
    /// Extra attempts for a failed chunk, each resuming from disk.
    pub retries: u32,
    pub timeout_secs: Option<u64>,
    /// Delete `.partN` files once merged.
    pub remove_chunks: bool,
    pub request: RequestConfig,
    pub client: ClientConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            resume: false,
            overwrite: false,
            retries: 3,
            timeout_secs: None,
            remove_chunks: true,
            request: RequestConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
