// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Host link: "connected" means the ingestion host accepts TCP connections

use anyhow::{Context, Result};
use async_trait::async_trait;
use powernode_core::Link;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct ProbeLink {
    target: String,
    connected: AtomicBool,
}

impl ProbeLink {
    /// Probe the host and port the ingestion URL points at
    pub fn for_url(url: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;
        let host = parsed
            .host_str()
            .with_context(|| format!("URL has no host: {url}"))?;
        let port = parsed
            .port_or_known_default()
            .with_context(|| format!("URL has no port: {url}"))?;

        Ok(Self {
            target: format!("{host}:{port}"),
            connected: AtomicBool::new(false),
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    async fn probe(&self) -> bool {
        let reachable = matches!(
            tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&self.target)).await,
            Ok(Ok(_))
        );

        let was = self.connected.swap(reachable, Ordering::SeqCst);
        if was != reachable {
            debug!(addr = %self.target, reachable, "Link state changed");
        }
        reachable
    }
}

#[async_trait]
impl Link for ProbeLink {
    async fn begin(&self) {
        self.probe().await;
    }

    async fn is_connected(&self) -> bool {
        self.probe().await
    }

    async fn reconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.probe().await;
    }

    fn name(&self) -> &str {
        "tcp-probe"
    }
}
