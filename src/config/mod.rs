//! Service configuration
//!
//! Loaded from a TOML file (`config.toml` or `$CONFIG_FILE`). A default file
//! is written on first start. Every field has a default, so a partial file
//! only needs the values it changes.

pub mod defaults;
pub mod duration_serde;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingestor::fetcher::FetchOptions;
use defaults::*;
use duration_serde::duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    pub runtime: RuntimeConfig,
    pub web: WebConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub listings: Vec<ListingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Address of the box; empty disables the device load
    pub host: String,
    pub rest_port: u16,
    #[serde(with = "duration")]
    pub request_timeout: Duration,
    pub detail_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub listing_dir: PathBuf,
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub chunk_size: u64,
    #[serde(with = "duration")]
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    #[serde(with = "duration")]
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// One remote XMLTV feed to keep refreshed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    pub url: String,
    #[serde(default = "default_update_cron")]
    pub update_cron: String,
    #[serde(default)]
    pub run_now: bool,
    /// Base for relative icon paths; defaults to the feed URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_base_url: Option<String>,
}

fn default_update_cron() -> String {
    DEFAULT_UPDATE_CRON.to_string()
}

fn parse_default_duration(value: &str) -> Duration {
    humantime::parse_duration(value).unwrap_or(Duration::from_secs(60))
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DEVICE_HOST.to_string(),
            rest_port: DEFAULT_DEVICE_REST_PORT,
            request_timeout: parse_default_duration(DEFAULT_DEVICE_TIMEOUT),
            detail_concurrency: DEFAULT_DETAIL_CONCURRENCY,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            listing_dir: PathBuf::from(DEFAULT_LISTING_DIR),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: parse_default_duration(DEFAULT_FETCH_TIMEOUT),
            user_agent: format!("skyq-epg/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: parse_default_duration(DEFAULT_SHUTDOWN_GRACE),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl FetchConfig {
    pub fn to_options(&self) -> FetchOptions {
        FetchOptions {
            chunk_size: self.chunk_size,
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
        }
    }
}

impl Config {
    /// Load from `path`, `$CONFIG_FILE` or `config.toml`, writing defaults if missing
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_file = match path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(
                std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string()),
            ),
        };

        if config_file.exists() {
            let contents = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read {}", config_file.display()))?;
            let config: Self = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", config_file.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = config_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&config_file, contents)
                .with_context(|| format!("Failed to write {}", config_file.display()))?;
            Ok(default_config)
        }
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.fetch.chunk_size > 0, "fetch.chunk_size must be positive");
        anyhow::ensure!(
            self.device.detail_concurrency > 0,
            "device.detail_concurrency must be positive"
        );
        for listing in &self.listings {
            crate::utils::url::validate_listing_url(&listing.url)
                .map_err(|e| anyhow::anyhow!("listings: {e}"))?;
            crate::utils::cron_helper::parse_schedule(&listing.update_cron)
                .map_err(|e| anyhow::anyhow!("listings: {e}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [device]
            host = "192.168.1.20"

            [fetch]
            timeout = "30s"

            [[listings]]
            url = "http://example.com/epg.xml.gz"
            run_now = true
            "#,
        )
        .unwrap();

        assert_eq!(config.device.host, "192.168.1.20");
        assert_eq!(config.device.rest_port, 9006);
        assert_eq!(config.fetch.timeout, Duration::from_secs(30));
        assert_eq!(config.fetch.chunk_size, 256 * 1024);
        assert_eq!(config.storage.listing_dir, PathBuf::from(".epg_data"));
        assert_eq!(config.listings[0].update_cron, "0 3 * * *");
        assert!(config.listings[0].run_now);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_listing() {
        let mut config = Config::default();
        config.listings.push(ListingConfig {
            url: "http://example.com/epg.xml".to_string(),
            update_cron: "whenever".to_string(),
            run_now: false,
            icon_base_url: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.web.port, DEFAULT_PORT);

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.runtime.shutdown_grace, Duration::from_secs(10));
    }
}
