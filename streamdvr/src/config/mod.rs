//! Typed configuration.
//!
//! The whole daemon is configured from a single JSON document. Every field
//! has a default so a minimal file only needs to list its sites.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::utils::fs;
use crate::{Error, Result};

/// Environment variable holding the config file path.
pub const CONFIG_PATH_ENV: &str = "STREAMDVR_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/streamdvr.json";

/// Default number of concurrent status checks per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DvrConfig {
    pub recording: RecordingConfig,
    pub proxy: ProxyConfig,
    pub debug: DebugConfig,
    /// Directory for the rolling log files.
    pub log_dir: PathBuf,
    /// Seconds between polling cycles.
    pub poll_interval_secs: u64,
    /// Seconds to wait for recorders to exit during shutdown.
    pub shutdown_grace_secs: u64,
    pub sites: Vec<SiteConfig>,
}

impl Default for DvrConfig {
    fn default() -> Self {
        Self {
            recording: RecordingConfig::default(),
            proxy: ProxyConfig::default(),
            debug: DebugConfig::default(),
            log_dir: PathBuf::from("logs"),
            poll_interval_secs: 60,
            shutdown_grace_secs: 30,
            sites: Vec::new(),
        }
    }
}

/// Where and how recordings are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory recorders write into.
    pub capture_directory: PathBuf,
    /// Directory finished recordings are moved into.
    pub complete_directory: PathBuf,
    /// Recordings smaller than this (MB) are deleted on exit.
    pub min_size_mb: u64,
    /// Recordings reaching this size (MB) are halted. 0 disables the limit.
    pub max_size_mb: u64,
    /// Put the site name into the recording filename.
    pub include_site_in_file: bool,
    /// Group completed recordings by site.
    pub site_subdir: bool,
    /// Group completed recordings by streamer.
    pub streamer_subdir: bool,
    /// Suffix streamer directories with the site name.
    pub include_site_in_dir: bool,
    /// chrono format string used for the timestamp part of filenames.
    pub date_format: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            capture_directory: PathBuf::from("capturing"),
            complete_directory: PathBuf::from("complete"),
            min_size_mb: 5,
            max_size_mb: 0,
            include_site_in_file: false,
            site_subdir: false,
            streamer_subdir: true,
            include_site_in_dir: false,
            date_format: "%Y%m%d-%H%M%S".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub enable: bool,
    pub server: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Emit debug-level messages from the orchestration core.
    pub log: bool,
    /// Redirect recorder output to `<filename>.log`.
    pub recorder: bool,
}

/// Per-site configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Display name of the site, e.g. `Twitch`.
    pub name: String,
    /// Base URL streamer names are appended to.
    pub site_url: Option<String>,
    /// Appended after the streamer name when building the page URL.
    pub url_suffix: String,
    /// Script printing the stream locator for an online streamer.
    pub m3u8_fetch: PathBuf,
    /// Recorder executable.
    pub recorder: PathBuf,
    /// Concurrent status checks per batch. 0 checks everyone at once.
    pub batch_size: usize,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Persisted streamer list.
    pub streamers: Vec<String>,
    /// Optional include/exclude file processed every cycle.
    pub updates_file: Option<PathBuf>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            site_url: None,
            url_suffix: String::new(),
            m3u8_fetch: PathBuf::from("scripts/m3u8_streamlink.sh"),
            recorder: PathBuf::from("scripts/record_streamlink.sh"),
            batch_size: DEFAULT_BATCH_SIZE,
            username: None,
            password: None,
            streamers: Vec::new(),
            updates_file: None,
        }
    }
}

impl SiteConfig {
    /// Lowercase site name used for list names, flags and filenames.
    pub fn list_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Report missing settings. A broken site is still constructed.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("site is missing a name"));
        }
        if self.site_url.as_deref().is_none_or(str::is_empty) {
            return Err(Error::config(format!("{} is missing site_url", self.name)));
        }
        Ok(())
    }
}

impl DvrConfig {
    /// Resolve the config path from the environment.
    pub fn path_from_env() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io_path("reading config", path, e))?;
        let config: Self = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), sites = config.sites.len(), "Loaded configuration");

        for site in &config.sites {
            if let Err(e) = site.validate() {
                warn!("{}", e);
            }
        }

        Ok(config)
    }

    /// Write the configuration back, e.g. after the streamer list changed.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write_atomic(path, raw.as_bytes()).await
    }

    /// Replace the persisted streamer list of a site.
    pub fn set_site_streamers(&mut self, site: &str, streamers: Vec<String>) -> bool {
        match self.sites.iter_mut().find(|s| s.name == site) {
            Some(cfg) => {
                cfg.streamers = streamers;
                true
            }
            None => false,
        }
    }
}
