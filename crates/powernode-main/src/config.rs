// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Binary configuration: the node settings plus the host stand-ins

use anyhow::{Context, Result, bail};
use powernode_core::NodeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CONFIG_ENV: &str = "POWERNODE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "powernode.toml";

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub node: NodeConfig,

    /// Simulated meter used on hosts without metering hardware
    pub meter: MeterConfig,
}

/// The binary's own tables in the shared config file
#[derive(Debug, Default, Deserialize)]
struct HostSections {
    #[serde(default)]
    meter: MeterConfig,
}

fn default_voltage() -> f32 {
    230.0
}

fn default_current() -> f32 {
    1.5
}

fn default_frequency() -> f32 {
    50.0
}

fn default_pf() -> f32 {
    0.95
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    #[serde(default = "default_voltage")]
    pub nominal_voltage: f32,

    #[serde(default = "default_current")]
    pub nominal_current: f32,

    #[serde(default = "default_frequency")]
    pub frequency: f32,

    #[serde(default = "default_pf")]
    pub pf: f32,

    /// Every Nth read answers NaN, like a meter that misses a frame. 0 disables.
    #[serde(default)]
    pub fault_every: u32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            nominal_voltage: default_voltage(),
            nominal_current: default_current(),
            frequency: default_frequency(),
            pf: default_pf(),
            fault_every: 0,
        }
    }
}

/// `$POWERNODE_CONFIG`, or `powernode.toml` in the working directory
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path(), |key| std::env::var(key).ok())
    }

    /// Load `path`, falling back to defaults when it does not exist.
    /// Endpoint environment overrides apply either way.
    pub fn load_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                let node = NodeConfig::from_toml(&content)
                    .with_context(|| format!("Invalid node configuration in {}", path.display()))?;
                let host: HostSections = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                info!("Loaded configuration from {}", path.display());
                AppConfig {
                    node,
                    meter: host.meter,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No configuration at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let endpoints = &mut self.node.endpoints;

        if let Some(url) = env("POWERNODE_INGEST_URL") {
            endpoints.ingest_url = url;
        }
        if let Some(url) = env("POWERNODE_VERSION_URL") {
            endpoints.version_url = url;
        }
        if let Some(url) = env("POWERNODE_IMAGE_URL") {
            endpoints.image_url = url;
        }
        if let Some(dir) = env("POWERNODE_IMAGE_DIR") {
            self.node.storage.image_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;

        let meter = &self.meter;
        if !(meter.nominal_voltage.is_finite() && meter.nominal_voltage > 0.0) {
            bail!("meter.nominal_voltage must be a positive number");
        }
        if !(0.0..=1.0).contains(&meter.pf) {
            bail!("meter.pf must be between 0 and 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powernode_core::TlsPolicy;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml"), no_env).unwrap();

        assert_eq!(config.node.pipeline.queue_capacity, 10);
        assert_eq!(config.meter.nominal_voltage, 230.0);
    }

    #[test]
    fn test_sections_share_one_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("powernode.toml");
        std::fs::write(
            &path,
            r#"
            [endpoints]
            ingest_url = "http://192.168.1.10:1880/power"

            [pipeline]
            sample_interval_ms = 1000

            [update]
            tls = "verified"

            [meter]
            nominal_voltage = 120.0
            fault_every = 7
            "#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path, no_env).unwrap();
        assert_eq!(
            config.node.endpoints.ingest_url,
            "http://192.168.1.10:1880/power"
        );
        assert_eq!(config.node.pipeline.sample_interval_ms, 1000);
        assert_eq!(config.node.update.tls, TlsPolicy::Verified);
        assert_eq!(config.meter.nominal_voltage, 120.0);
        assert_eq!(config.meter.fault_every, 7);
        assert_eq!(config.meter.frequency, 50.0);
    }

    #[test]
    fn test_env_overrides_endpoints() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml"), |key| {
            (key == "POWERNODE_INGEST_URL").then(|| "http://10.1.1.1/power".to_owned())
        })
        .unwrap();

        assert_eq!(config.node.endpoints.ingest_url, "http://10.1.1.1/power");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("powernode.toml");
        std::fs::write(&path, "[pipeline]\nsample_interval_ms = \"often\"").unwrap();

        assert!(AppConfig::load_from(&path, no_env).is_err());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("powernode.toml");
        std::fs::write(&path, "[pipeline]\ndequeue_wait_ms = 0").unwrap();

        assert!(AppConfig::load_from(&path, no_env).is_err());
    }

    #[test]
    fn test_meter_pf_out_of_range() {
        let mut config = AppConfig::default();
        config.meter.pf = 1.5;
        assert!(config.validate().is_err());
    }
}
