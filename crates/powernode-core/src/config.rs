// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Node configuration

use crate::error::{NodeError, Result};
use crate::version::VersionComparator;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Handoff queue slots
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

fn default_ingest_url() -> String {
    "http://127.0.0.1:1880/power".to_owned()
}

fn default_version_url() -> String {
    "http://127.0.0.1:8080/firmware/version.txt".to_owned()
}

fn default_image_url() -> String {
    "http://127.0.0.1:8080/firmware/powernode.bin".to_owned()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_2000() -> u64 {
    2000
}

fn default_10() -> u64 {
    10
}

fn default_5000() -> u64 {
    5000
}

fn default_500() -> u64 {
    500
}

fn default_30() -> u64 {
    30
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("./firmware")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub endpoints: EndpointConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub update: UpdateConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Remote endpoints the node talks to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Ingestion endpoint receiving telemetry POSTs
    #[serde(default = "default_ingest_url")]
    pub ingest_url: String,

    /// Version authority returning the latest firmware version string
    #[serde(default = "default_version_url")]
    pub version_url: String,

    /// Firmware image location
    #[serde(default = "default_image_url")]
    pub image_url: String,

    /// Optional sha256sum-style digest of the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_sha256_url: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ingest_url: default_ingest_url(),
            version_url: default_version_url(),
            image_url: default_image_url(),
            image_sha256_url: None,
        }
    }
}

/// Sampling and publishing cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_2000")]
    pub sample_interval_ms: u64,

    /// How long the sampler may wait for a free queue slot
    #[serde(default = "default_10")]
    pub enqueue_wait_ms: u64,

    /// How long the publisher waits for a reading
    #[serde(default = "default_5000")]
    pub dequeue_wait_ms: u64,

    /// Sleep after requesting a reconnect
    #[serde(default = "default_5000")]
    pub reconnect_backoff_ms: u64,

    /// Delay between link attempts during startup
    #[serde(default = "default_500")]
    pub link_retry_delay_ms: u64,
}

impl PipelineConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn enqueue_wait(&self) -> Duration {
        Duration::from_millis(self.enqueue_wait_ms)
    }

    pub fn dequeue_wait(&self) -> Duration {
        Duration::from_millis(self.dequeue_wait_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn link_retry_delay(&self) -> Duration {
        Duration::from_millis(self.link_retry_delay_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sample_interval_ms: 2000,
            enqueue_wait_ms: 10,
            dequeue_wait_ms: 5000,
            reconnect_backoff_ms: 5000,
            link_retry_delay_ms: 500,
        }
    }
}

/// Certificate handling on the update channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TlsPolicy {
    /// Normal certificate validation
    Verified,
    /// Skip certificate validation; image integrity then relies on the
    /// optional digest only
    #[default]
    AcceptInvalidCerts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default)]
    pub tls: TlsPolicy,

    #[serde(default)]
    pub version_ordering: VersionComparator,

    /// Timeout for telemetry and version requests
    #[serde(default = "default_30")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_10")]
    pub connect_timeout_secs: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            tls: TlsPolicy::default(),
            version_ordering: VersionComparator::default(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the A/B image slots and the boot pointer
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
        }
    }
}

impl NodeConfig {
    /// Parse and validate. Tables other than the node's own are ignored.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: NodeConfig = toml::from_str(content)
            .map_err(|e| NodeError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let urls = [
            ("endpoints.ingest_url", &self.endpoints.ingest_url),
            ("endpoints.version_url", &self.endpoints.version_url),
            ("endpoints.image_url", &self.endpoints.image_url),
        ];
        for (name, url) in urls {
            if url.trim().is_empty() {
                return Err(NodeError::Config(format!("{name} must not be empty")));
            }
        }

        let intervals = [
            ("pipeline.sample_interval_ms", self.pipeline.sample_interval_ms),
            ("pipeline.dequeue_wait_ms", self.pipeline.dequeue_wait_ms),
            ("pipeline.reconnect_backoff_ms", self.pipeline.reconnect_backoff_ms),
            ("pipeline.link_retry_delay_ms", self.pipeline.link_retry_delay_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(NodeError::Config(format!("{name} must be positive")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.pipeline.queue_capacity, 10);
        assert_eq!(config.pipeline.sample_interval(), Duration::from_secs(2));
        assert_eq!(config.pipeline.enqueue_wait(), Duration::from_millis(10));
        assert_eq!(config.pipeline.dequeue_wait(), Duration::from_secs(5));
        assert_eq!(config.pipeline.reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(config.update.tls, TlsPolicy::AcceptInvalidCerts);
        assert_eq!(config.update.version_ordering, VersionComparator::Lexicographic);
        assert!(config.endpoints.image_sha256_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NodeConfig::from_toml(
            r#"
            [endpoints]
            ingest_url = "http://10.0.0.5:1880/power"

            [update]
            tls = "verified"
            version_ordering = "semantic"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.ingest_url, "http://10.0.0.5:1880/power");
        assert_eq!(config.endpoints.version_url, default_version_url());
        assert_eq!(config.update.tls, TlsPolicy::Verified);
        assert_eq!(config.update.version_ordering, VersionComparator::Semantic);
        assert_eq!(config.pipeline.queue_capacity, 10);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = NodeConfig::from_toml("").unwrap();
        assert_eq!(config.pipeline.sample_interval_ms, 2000);
        assert_eq!(config.storage.image_dir, PathBuf::from("./firmware"));
    }

    #[test]
    fn test_rejects_empty_url() {
        let result = NodeConfig::from_toml(
            r#"
            [endpoints]
            version_url = "  "
            "#,
        );
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let result = NodeConfig::from_toml(
            r#"
            [pipeline]
            sample_interval_ms = 0
            "#,
        );
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[test]
    fn test_unknown_tls_policy_is_rejected() {
        let result = NodeConfig::from_toml(
            r#"
            [update]
            tls = "whatever"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_foreign_tables_are_ignored() {
        let config = NodeConfig::from_toml(
            "[pipeline]\nqueue_capacity = 4\nsample_interval_ms = 250\n\n[meter]\nnominal_voltage = 120.0\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.queue_capacity, 4);
        assert_eq!(config.pipeline.sample_interval(), Duration::from_millis(250));
    }
}
