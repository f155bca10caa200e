//! Fetch module for retrieving pages from sites and embed hosts
//!
//! This module defines the `Fetcher` capability consumed by the locator and
//! resolver, and `Scraper`, its HTTP implementation with browser-like headers,
//! user agent rotation and retry with exponential backoff.

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[cfg(test)]
pub mod testing;

/// Errors that can occur during fetch operations
#[derive(Error, Debug)]
pub enum ScraperError {
    /// Network-related errors (connection timeout, DNS failure, etc.)
    #[error("Failed to connect to server: {0}")]
    NetworkError(String),

    /// HTTP non-2xx status code errors
    #[error("Server returned status {0}")]
    HttpError(u16),

    /// Error reading response body
    #[error("Failed to read response body: {0}")]
    ResponseError(String),

    /// Rate limited by server
    #[error("Rate limited, retry after delay")]
    RateLimited,
}

/// HTTP method of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

/// Options for a single fetch
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub method: Method,
    pub referer: Option<String>,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    /// Urlencoded form body, sent with POST
    pub form: Vec<(String, String)>,
}

impl FetchRequest {
    /// A GET with the given referer
    pub fn get(referer: Option<&str>) -> Self {
        Self {
            referer: referer.map(str::to_string),
            ..Self::default()
        }
    }

    /// A form POST with the given referer
    pub fn post_form(referer: Option<&str>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            referer: referer.map(str::to_string),
            form,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Encode the form fields as an `application/x-www-form-urlencoded` body
    pub fn encoded_form(&self) -> String {
        encode_pairs(&self.form, "&")
    }

    /// Value of the `Cookie` header, if any cookies are set
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            None
        } else {
            Some(encode_pairs(&self.cookies, "; "))
        }
    }
}

fn encode_pairs(pairs: &[(String, String)], separator: &str) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Result of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after following redirects, used as the base for relative links
    pub final_url: String,
    /// The body text of the response
    pub html: String,
    /// The HTTP status code
    pub status: u16,
}

/// Capability to fetch a page; implemented over HTTP by `Scraper`
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, following redirects transparently
    async fn fetch(&self, url: &str, request: &FetchRequest) -> Result<FetchedPage, ScraperError>;
}

/// Configuration for the HTTP fetcher
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Whether to rotate user agents
    pub rotate_user_agent: bool,
    /// Fixed user agent, overrides rotation
    pub user_agent: Option<String>,
    /// Retries after the first attempt, on rate limiting and server errors
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds
    pub backoff_base_ms: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            rotate_user_agent: true,
            user_agent: None,
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

impl ScraperConfig {
    /// Total attempts per request, the first one included
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// List of realistic user agents for rotation
const USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    // Chrome on macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    // Chrome on Android, several embed hosts serve simpler players to mobile
    "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
];

/// HTTP fetcher with browser-like headers
pub struct Scraper {
    client: Client,
    config: ScraperConfig,
    request_count: AtomicUsize,
}

impl Scraper {
    /// Create a new Scraper with default configuration
    pub fn new() -> Result<Self, ScraperError> {
        Self::with_config(ScraperConfig::default())
    }

    /// Create a new Scraper with custom configuration
    pub fn with_config(config: ScraperConfig) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .build()
            .map_err(|e| ScraperError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            config,
            request_count: AtomicUsize::new(0),
        })
    }

    /// User agent for the next request
    fn get_user_agent(&self) -> String {
        if let Some(agent) = &self.config.user_agent {
            return agent.clone();
        }
        if self.config.rotate_user_agent {
            let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
            USER_AGENTS[idx].to_string()
        } else {
            USER_AGENTS[0].to_string()
        }
    }

    /// Apply exponential backoff delay
    async fn apply_backoff(&self, attempt: u32) {
        let delay = self.config.backoff_base_ms * 2u64.pow(attempt);
        let jitter = rand::thread_rng().gen_range(0..250);
        sleep(Duration::from_millis(delay + jitter)).await;
    }

    /// Internal fetch implementation
    async fn do_fetch(&self, url: &str, request: &FetchRequest) -> Result<FetchedPage, ScraperError> {
        let user_agent = self.get_user_agent();

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self
                .client
                .post(url)
                .header("Content-Type", "application/x-www-form-urlencoded; charset=UTF-8")
                .body(request.encoded_form()),
        };

        builder = builder
            .header("User-Agent", user_agent)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9,id;q=0.8");

        if let Some(referer) = &request.referer {
            builder = builder.header("Referer", referer.as_str());
        }
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header("Cookie", cookie);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ScraperError::NetworkError("Connection timeout".to_string())
            } else if e.is_connect() {
                ScraperError::NetworkError("Failed to connect to server".to_string())
            } else {
                ScraperError::NetworkError(e.to_string())
            }
        })?;

        let status = response.status();
        let status_code = status.as_u16();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScraperError::RateLimited);
        }

        if !status.is_success() {
            return Err(ScraperError::HttpError(status_code));
        }

        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| ScraperError::ResponseError(e.to_string()))?;

        Ok(FetchedPage {
            final_url,
            html,
            status: status_code,
        })
    }

    /// Get current request count
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for Scraper {
    async fn fetch(&self, url: &str, request: &FetchRequest) -> Result<FetchedPage, ScraperError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let mut last_error = None;

        for attempt in 0..self.config.attempts() {
            if attempt > 0 {
                self.apply_backoff(attempt).await;
            }

            match self.do_fetch(url, request).await {
                Ok(page) => return Ok(page),
                Err(ScraperError::RateLimited) => {
                    tracing::warn!("Rate limited by {} on attempt {}, backing off...", url, attempt + 1);
                    last_error = Some(ScraperError::RateLimited);
                    continue;
                }
                Err(ScraperError::HttpError(status)) if status >= 500 => {
                    tracing::warn!("HTTP {} from {} on attempt {}, retrying...", status, url, attempt + 1);
                    last_error = Some(ScraperError::HttpError(status));
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(ScraperError::NetworkError("Max retries exceeded".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scraper_creation() {
        let scraper = Scraper::new().unwrap();
        assert_eq!(scraper.request_count(), 0);
    }

    #[test]
    fn test_scraper_with_config() {
        let config = ScraperConfig {
            timeout_secs: 5,
            rotate_user_agent: false,
            user_agent: None,
            max_retries: 5,
            backoff_base_ms: 2000,
        };
        let scraper = Scraper::with_config(config).unwrap();
        assert_eq!(scraper.config.timeout_secs, 5);
        assert_eq!(scraper.config.max_retries, 5);
        assert_eq!(scraper.get_user_agent(), USER_AGENTS[0]);
    }

    #[test]
    fn test_user_agent_rotation() {
        let scraper = Scraper::new().unwrap();
        let ua = scraper.get_user_agent();
        assert!(USER_AGENTS.contains(&ua.as_str()));
    }

    #[test]
    fn test_fixed_user_agent_overrides_rotation() {
        let config = ScraperConfig {
            user_agent: Some("custom-agent/1.0".to_string()),
            ..ScraperConfig::default()
        };
        let scraper = Scraper::with_config(config).unwrap();
        assert_eq!(scraper.get_user_agent(), "custom-agent/1.0");
    }

    #[test]
    fn test_encoded_form() {
        let request = FetchRequest::post_form(
            Some("https://site/ep"),
            vec![
                ("action".to_string(), "doo_player_ajax".to_string()),
                ("post".to_string(), "12 34".to_string()),
                ("nonce".to_string(), "a&b".to_string()),
            ],
        );
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.encoded_form(), "action=doo_player_ajax&post=12%2034&nonce=a%26b");
    }

    #[test]
    fn test_cookie_header() {
        assert!(FetchRequest::default().cookie_header().is_none());
        let request = FetchRequest::get(None).cookie("session", "abc").cookie("lang", "id");
        assert_eq!(request.cookie_header().as_deref(), Some("session=abc; lang=id"));
    }

    #[test]
    fn test_default_config() {
        let config = ScraperConfig::default();
        assert_eq!(config.timeout_secs, 15);
        assert!(config.rotate_user_agent);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.attempts(), 3);
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let config = ScraperConfig {
            max_retries: 0,
            ..ScraperConfig::default()
        };
        assert_eq!(config.attempts(), 1);

        let config = ScraperConfig {
            max_retries: u32::MAX,
            ..ScraperConfig::default()
        };
        assert_eq!(config.attempts(), u32::MAX);
    }
}
