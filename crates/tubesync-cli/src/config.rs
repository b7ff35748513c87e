use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tubesync::{ExponentialBackoff, MAX_PAGE_SIZE, PageWalker};

/// Environment variable holding the YouTube Data API key.
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// YouTube Data API key. `YOUTUBE_API_KEY` takes precedence.
    pub api_key: Option<String>,
    /// Channel synced when `sync` is run without `--channel`.
    pub channel_id: Option<String>,
    /// Override for the API endpoint, mostly for local mocks.
    pub api_base_url: Option<String>,
    /// `maxResults` for paged listings, at most 50.
    pub page_size: Option<usize>,
    /// SQLite file. Defaults to `tubesync/catalog.db` in the user cache dir.
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub include_playlists: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backoff for transport failures. Zero retries keeps the fail-fast default.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_min_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl AppConfig {
    /// The API key from the environment, falling back to the config file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }

    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn walker(&self) -> PageWalker {
        if self.retry.max_retries == 0 {
            return PageWalker::new();
        }
        PageWalker::with_retry(ExponentialBackoff::new(
            Duration::from_millis(self.retry.min_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.max_retries,
        ))
    }
}

/// Config file path: `~/.config/tubesync/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tubesync").join("config.toml"))
}

/// Load config from file, falling back to defaults if missing.
pub fn load_config() -> AppConfig {
    if let Some(path) = config_path()
        && let Ok(contents) = std::fs::read_to_string(&path)
    {
        match toml::from_str::<AppConfig>(&contents) {
            Ok(config) => return config,
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config, using defaults"
            ),
        }
    }

    AppConfig::default()
}
