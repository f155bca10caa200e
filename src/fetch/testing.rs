//! In-memory fetcher for pipeline tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

use super::{FetchRequest, FetchedPage, Fetcher, Method, ScraperError};

/// Serves canned bodies by URL and records every request
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<(Method, String)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    /// Serve `to`'s body when `from` is requested, reporting `to` as final URL
    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    /// Answer requests for `url` only after `delay`
    pub fn delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count_for(&self, url: &str) -> usize {
        self.requests().iter().filter(|(_, u)| u == url).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, request: &FetchRequest) -> Result<FetchedPage, ScraperError> {
        self.requests.lock().unwrap().push((request.method, url.to_string()));
        if let Some(delay) = self.delays.get(url) {
            sleep(*delay).await;
        }

        let final_url = self.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        match self.pages.get(&final_url) {
            Some(body) => Ok(FetchedPage {
                final_url,
                html: body.clone(),
                status: 200,
            }),
            None => Err(ScraperError::HttpError(404)),
        }
    }
}
