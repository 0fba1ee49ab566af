// src/client.rs

use std::time::Duration;

use reqwest::{redirect, Client, Proxy};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0";

/// How the per-egress HTTP clients are built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local SOCKS5 ports, one client per port. Empty means one direct client.
    pub proxy_ports: Vec<u16>,
    pub proxy_host: String,
    pub connect_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_ports: Vec::new(),
            proxy_host: "127.0.0.1".to_string(),
            connect_timeout_secs: Some(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

fn builder(config: &ClientConfig) -> reqwest::ClientBuilder {
    // Redirects are followed by hand so the follow flag and resume offset apply to every hop.
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .redirect(redirect::Policy::none());
    if let Some(secs) = config.connect_timeout_secs {
        builder = builder.connect_timeout(Duration::from_secs(secs));
    }
    builder
}

/// One client per configured egress point.
pub fn build_clients(config: &ClientConfig) -> Result<Vec<Client>, reqwest::Error> {
    if config.proxy_ports.is_empty() {
        return Ok(vec![builder(config).build()?]);
    }
    config
        .proxy_ports
        .iter()
        .map(|port| {
            let proxy = format!("socks5h://{}:{}", config.proxy_host, port);
            debug!("building client through {}", proxy);
            builder(config).proxy(Proxy::all(proxy)?).build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_client_when_no_ports() {
        let clients = build_clients(&ClientConfig::default()).unwrap();
        assert_eq!(clients.len(), 1);
    }

    #[test]
    fn one_client_per_proxy_port() {
        let config = ClientConfig {
            proxy_ports: vec![9050, 9051, 9052],
            ..ClientConfig::default()
        };
        assert_eq!(build_clients(&config).unwrap().len(), 3);
    }
}
