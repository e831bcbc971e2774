use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use url::Url;

use super::tracking::tracker::TrackerSettings;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const STORE_FILE_NAME: &str = "storage.json";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3000/log";
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_FIRST_FLUSH_DELAY_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_BATCH_HOSTS: usize = 200;

/// Values that can be changed without touching the config file.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigOverrides {
    #[arg(
        long = "backend-url",
        env = "TABTALLY_BACKEND_URL",
        help = "Endpoint receiving accumulated records"
    )]
    pub backend_url: Option<String>,
    #[arg(
        long = "flush-interval-secs",
        env = "TABTALLY_FLUSH_INTERVAL_SECS",
        help = "Seconds between uploads"
    )]
    pub flush_interval_secs: Option<u64>,
}

/// Optional `config.json` in the application directory.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(alias = "backend_url")]
    pub backend_url: Option<String>,
    pub flush_interval_secs: Option<u64>,
    pub first_flush_delay_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_batch_hosts: Option<usize>,
}

impl ConfigFile {
    /// A missing file is the same as an empty one. A file that doesn't parse is an error, running
    /// with silently ignored settings would send data to the wrong place.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {path:?}")),
        };
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse {path:?}"))
    }
}

/// Fully resolved settings of the host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub app_dir: PathBuf,
    pub backend_url: Url,
    pub flush_interval: Duration,
    pub first_flush_delay: Duration,
    pub request_timeout: Duration,
    /// Pending hosts that trigger an early flush.
    pub max_batch_hosts: usize,
}

impl HostConfig {
    /// Layers defaults, the config file in `app_dir` and `overrides`, later ones winning.
    pub fn resolve(app_dir: PathBuf, overrides: &ConfigOverrides) -> Result<Self> {
        let file = ConfigFile::load(&app_dir.join(CONFIG_FILE_NAME))?;

        let backend_url = overrides
            .backend_url
            .clone()
            .or(file.backend_url)
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let backend_url = Url::parse(&backend_url)
            .with_context(|| format!("Invalid backend url {backend_url}"))?;
        if !matches!(backend_url.scheme(), "http" | "https") {
            bail!("Backend url {backend_url} must use http or https");
        }

        let flush_interval_secs = overrides
            .flush_interval_secs
            .or(file.flush_interval_secs)
            .unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS);
        if flush_interval_secs == 0 {
            bail!("Flush interval must be at least one second");
        }

        let max_batch_hosts = file.max_batch_hosts.unwrap_or(DEFAULT_MAX_BATCH_HOSTS);
        if max_batch_hosts == 0 {
            bail!("Batch size must be at least one host");
        }

        Ok(Self {
            app_dir,
            backend_url,
            flush_interval: Duration::from_secs(flush_interval_secs),
            first_flush_delay: Duration::from_secs(
                file.first_flush_delay_secs
                    .unwrap_or(DEFAULT_FIRST_FLUSH_DELAY_SECS),
            ),
            request_timeout: Duration::from_secs(
                file.request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            max_batch_hosts,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.app_dir.join(STORE_FILE_NAME)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        let defaults = TrackerSettings::default();
        TrackerSettings {
            flush_interval: chrono::Duration::from_std(self.flush_interval)
                .unwrap_or(defaults.flush_interval),
            max_batch_hosts: self.max_batch_hosts,
            ..defaults
        }
    }
}
