//! Engine configuration.
//!
//! Configuration is stored at `~/.config/sitesync/config.json`. The
//! backend endpoint fields can be overridden from the environment
//! (`SITESYNC_BACKEND_URL`, `SITESYNC_API_KEY`), with `.env` files
//! honoured via dotenvy.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path
const APP_NAME: &str = "sitesync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

fn default_stale_after_minutes() -> i64 {
    5
}

fn default_fetch_timeout_secs() -> u64 {
    5
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
    /// Cache entries older than this are considered stale.
    #[serde(default = "default_stale_after_minutes")]
    pub stale_after_minutes: i64,
    /// Per-fetch timeout before falling back to placeholder data.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Interval of the background staleness refresh timer.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Poll interval of the REST backend's change feed.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            stale_after_minutes: default_stale_after_minutes(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let path = Self::config_path()?;
        let mut config = Self::read_from(&path)?;

        if let Ok(url) = std::env::var("SITESYNC_BACKEND_URL") {
            config.backend_url = Some(url);
        }
        if let Ok(key) = std::env::var("SITESYNC_API_KEY") {
            config.api_key = Some(key);
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.write_to(&Self::config_path()?)
    }

    fn read_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::minutes(self.stale_after_minutes)
    }

    pub fn fetch_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.fetch_timeout_secs)
    }

    pub fn refresh_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.refresh_interval_secs)
    }

    pub fn poll_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.poll_interval_secs)
    }
}
