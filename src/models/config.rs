//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::CrawlSource;

/// Upper bound accepted for `import.pool_timeout_hours` (one year).
pub const MAX_POOL_TIMEOUT_HOURS: u64 = 24 * 365;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Import scheduling settings
    #[serde(default)]
    pub import: ImportConfig,

    /// Suggestion lookup settings
    #[serde(default)]
    pub suggestions: SuggestionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.import.workers == 0 {
            return Err(AppError::validation("import.workers must be > 0"));
        }
        if self.import.pool_timeout_hours == 0 {
            return Err(AppError::validation(
                "import.pool_timeout_hours must be > 0",
            ));
        }
        if self.import.pool_timeout_hours > MAX_POOL_TIMEOUT_HOURS {
            return Err(AppError::validation(format!(
                "import.pool_timeout_hours must be <= {MAX_POOL_TIMEOUT_HOURS}"
            )));
        }
        if self.import.sources.is_empty() {
            return Err(AppError::validation("No sources defined"));
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between chapter requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
        }
    }
}

/// Import scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Sources to import from, processed in order
    #[serde(default = "defaults::sources")]
    pub sources: Vec<CrawlSource>,

    /// Number of concurrent workers per source
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// How long to wait for a source's workers before giving up
    #[serde(default = "defaults::pool_timeout_hours")]
    pub pool_timeout_hours: u64,
}

impl ImportConfig {
    pub fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout_hours.saturating_mul(3600))
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            sources: defaults::sources(),
            workers: defaults::workers(),
            pool_timeout_hours: defaults::pool_timeout_hours(),
        }
    }
}

/// Suggestion lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default = "defaults::suggestions_enabled")]
    pub enabled: bool,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::suggestions_enabled(),
        }
    }
}

mod defaults {
    use crate::models::CrawlSource;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; manga-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        600
    }
    pub fn request_delay() -> u64 {
        0
    }

    // Import defaults
    pub fn sources() -> Vec<CrawlSource> {
        vec![CrawlSource::MangaFox]
    }
    pub fn workers() -> usize {
        32
    }
    pub fn pool_timeout_hours() -> u64 {
        72
    }

    pub fn suggestions_enabled() -> bool {
        true
    }
}
