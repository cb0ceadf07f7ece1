// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! HTTP transport for telemetry, version checks and image transfer
//!
//! Telemetry and update traffic use separate clients: the update channel
//! carries its own certificate policy, and image streams are only bounded
//! by the connect timeout.

use crate::config::{TlsPolicy, UpdateConfig};
use crate::error::{NodeError, Result};
use crate::image_store::{ImageStore, parse_sha256_line};
use futures_util::StreamExt;
use powernode_shared::IngestReply;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("powernode/", env!("CARGO_PKG_VERSION"));

/// Result of requesting the firmware image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFetch {
    /// The whole body was handed to the store
    Received { bytes: u64 },
    /// Server answered 304: nothing newer to send
    NotModified,
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    telemetry: Client,
    update: Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

        let telemetry = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        let mut update = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout);
        if config.tls == TlsPolicy::AcceptInvalidCerts {
            warn!("Update channel accepts invalid TLS certificates (update.tls = \"accept-invalid-certs\")");
            update = update.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            telemetry,
            update: update.build()?,
            request_timeout,
        })
    }

    /// POST one serialized reading. Any HTTP response is a delivery; only a
    /// failure to get a response at all is an error.
    pub async fn post_reading(&self, url: &str, body: String) -> Result<IngestReply> {
        let response = self
            .telemetry
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("Failed to read ingest reply body: {e}");
                String::new()
            }
        };

        Ok(IngestReply::from_body(status, &body))
    }

    /// Fetch the plain-text version string published by the version authority
    pub async fn fetch_version(&self, url: &str) -> Result<String> {
        let response = self
            .update
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(NodeError::VersionCheck {
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?.trim().to_owned())
    }

    /// Fetch a sha256sum-style digest file and return the digest
    pub async fn fetch_digest(&self, url: &str) -> Result<String> {
        let response = self
            .update
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NodeError::Transfer(format!(
                "digest request returned {status}"
            )));
        }

        parse_sha256_line(&response.text().await?)
    }

    /// Stream the image into `store`.
    ///
    /// A close-delimited body cut short is indistinguishable from a complete
    /// one, so unless the caller verifies a digest the server must report
    /// the image size up front.
    ///
    /// On success the store holds an uncommitted transfer; committing is up
    /// to the caller. On any error the transfer has already been aborted.
    pub async fn fetch_image(
        &self,
        url: &str,
        store: &mut dyn ImageStore,
        digest_verified: bool,
    ) -> Result<ImageFetch> {
        let response = self
            .update
            .get(url)
            .send()
            .await
            .map_err(|e| NodeError::Transfer(format!("request failed: {e}")))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_MODIFIED => return Ok(ImageFetch::NotModified),
            status => {
                return Err(NodeError::Transfer(format!(
                    "image request returned {status}"
                )));
            }
        }

        let total = response.content_length();
        if total.is_none() && !digest_verified {
            return Err(NodeError::Transfer("server did not report image size".to_owned()));
        }
        store.begin(total)?;

        let mut progress = Progress::new(total);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let written = chunk
                .map_err(|e| NodeError::Transfer(format!("stream interrupted: {e}")))
                .and_then(|chunk| store.write(&chunk).map(|()| chunk.len() as u64));

            match written {
                Ok(len) => progress.advance(len),
                Err(e) => {
                    warn!(
                        received = progress.received,
                        percent = ?progress.percent(),
                        "Image transfer aborted: {e}"
                    );
                    store.abort();
                    return Err(e);
                }
            }
        }

        info!(bytes = progress.received, "Image transfer finished");
        Ok(ImageFetch::Received {
            bytes: progress.received,
        })
    }
}

/// Logs transfer progress in 10% steps
#[derive(Debug)]
struct Progress {
    total: Option<u64>,
    received: u64,
    last_step: u64,
}

impl Progress {
    fn new(total: Option<u64>) -> Self {
        match total {
            Some(total) => info!(total, "Image transfer started"),
            None => info!("Image transfer started, size unknown"),
        }

        Self {
            total,
            received: 0,
            last_step: 0,
        }
    }

    fn advance(&mut self, len: u64) {
        self.received += len;

        let Some(total) = self.total.filter(|t| *t > 0) else {
            return;
        };

        let step = (self.received.min(total) * 10) / total;
        if step > self.last_step {
            self.last_step = step;
            info!(
                received = self.received,
                total,
                "Image transfer progress: {}%",
                step * 10
            );
        }
    }

    fn percent(&self) -> Option<u64> {
        self.total
            .filter(|t| *t > 0)
            .map(|total| self.received.min(total) * 100 / total)
    }
}
