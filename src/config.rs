//! Configuration module for the stream resolver
//!
//! Handles loading environment variables and application configuration.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::fetch::ScraperConfig;
use crate::locator::SiteProfile;
use crate::resolver::DEFAULT_MAX_DEPTH;

/// Errors loading configuration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid site profiles in {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Per-request timeout of the page fetcher, in seconds
    pub fetch_timeout_secs: u64,
    /// Retries on rate limiting and server errors
    pub fetch_max_retries: u32,
    /// Hop ceiling below the entry page
    pub max_resolve_depth: u8,
    /// Lifetime of cached resolutions, in seconds; 0 disables the cache
    pub cache_ttl_secs: u64,
    /// Optional JSON file with extra site profiles
    pub site_profiles_path: Option<String>,
    /// Fixed User-Agent; rotated when unset
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            fetch_timeout_secs: 15,
            fetch_max_retries: 2,
            max_resolve_depth: DEFAULT_MAX_DEPTH,
            cache_ttl_secs: 300,
            site_profiles_path: None,
            user_agent: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs),
            fetch_max_retries: env_or("FETCH_MAX_RETRIES", defaults.fetch_max_retries),
            max_resolve_depth: env_or("MAX_RESOLVE_DEPTH", defaults.max_resolve_depth),
            cache_ttl_secs: env_or("CACHE_TTL_SECS", defaults.cache_ttl_secs),
            site_profiles_path: non_empty(env::var("SITE_PROFILES_PATH").ok()),
            user_agent: non_empty(env::var("USER_AGENT").ok()),
        }
    }

    /// Settings for the HTTP fetcher
    pub fn scraper_config(&self) -> ScraperConfig {
        ScraperConfig {
            timeout_secs: self.fetch_timeout_secs,
            rotate_user_agent: self.user_agent.is_none(),
            user_agent: self.user_agent.clone(),
            max_retries: self.fetch_max_retries,
            ..ScraperConfig::default()
        }
    }

    /// Cache lifetime, or None when caching is disabled
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }

    /// Extra site profiles from `site_profiles_path`, if configured
    pub fn load_site_profiles(&self) -> Result<Vec<SiteProfile>, ConfigError> {
        match &self.site_profiles_path {
            Some(path) => load_site_profiles(path),
            None => Ok(Vec::new()),
        }
    }
}

/// Read a JSON array of site profiles
pub fn load_site_profiles(path: impl AsRef<Path>) -> Result<Vec<SiteProfile>, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse { path: display, source })
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr>(key: &str, raw: &str, default: T) -> T {
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("Ignoring invalid {}={:?}, using default", key, raw);
            default
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
