//! Configuration retrieval
//!
//! The device has no persistent state of its own: the configuration is
//! fetched from command & control at every start, with a local file as
//! fallback when the network is not available yet.

use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use super::AuthboxConfig;
use crate::error::{AppError, Result};

/// Command & control base URL used when none is given on the command line
pub const DEFAULT_CONTROL_URL: &str = "http://control.shop";

/// Environment variable naming the local fallback file
pub const LOCAL_CONFIG_ENV: &str = "LOCAL_CONFIG_FILE";

const REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Loads the configuration document, remote first then local
pub struct ConfigLoader {
    client: reqwest::Client,
    control_url: String,
    local_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader for the given command & control URL and fallback file
    pub fn new(control_url: &str, local_path: Option<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REMOTE_TIMEOUT).build()?;

        Ok(Self {
            client,
            control_url: control_url.trim_end_matches('/').to_string(),
            local_path,
        })
    }

    /// Load the configuration for `hostname`
    ///
    /// Any failure of the remote path (network, status, parsing or
    /// validation) falls through to the local file.
    pub async fn load(&self, hostname: &str) -> Result<AuthboxConfig> {
        match self.fetch_remote(hostname).await {
            Ok(config) => {
                info!("Loaded configuration from {}", self.control_url);
                return Ok(config);
            }
            Err(e) => warn!(
                "Could not retrieve configuration from {}: {}, trying local file",
                self.control_url, e
            ),
        }

        let config = self.read_local().await?;
        info!("Loaded configuration from local file");
        Ok(config)
    }

    /// GET `<control-url>/config/<hostname>`
    pub async fn fetch_remote(&self, hostname: &str) -> Result<AuthboxConfig> {
        let url = format!(
            "{}/config/{}",
            self.control_url,
            urlencoding::encode(hostname)
        );
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        AuthboxConfig::from_json(&body)
    }

    /// Read the fallback file
    pub async fn read_local(&self) -> Result<AuthboxConfig> {
        let path = self.local_path.as_ref().ok_or_else(|| {
            AppError::Config(format!(
                "no local configuration file (set {} or --config-file)",
                LOCAL_CONFIG_ENV
            ))
        })?;

        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;

        AuthboxConfig::from_json(&raw)
    }
}
