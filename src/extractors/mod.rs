//! Extractors for embed hosts
//!
//! An extractor turns one embed host's player page into direct media links,
//! or reports the next page to hop to. The registry is consulted by host
//! substring before the generic `file:` scan is tried.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::fetch::Fetcher;
use crate::models::{ContainerType, ExtractionContext, Resolution, ResolvedLink, SubtitleTrack};
use crate::parser::{extract_tracks, find_file_entries, unpack_packed_scripts};
use crate::urls::{host_matches, normalize_url, origin_of};

mod dood;
mod generic;
mod packed;

pub use dood::DoodExtractor;
pub use generic::GenericExtractor;
pub use packed::PackedPlayerExtractor;

/// Outcome of one extraction step
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Terminal result, possibly empty
    Done(Resolution),
    /// The page only forwards to another URL (absolute)
    Hop(String),
}

/// Resolver for one family of embed hosts
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name reported as the `source_name` of emitted links
    fn name(&self) -> &str;

    /// Host substrings this extractor handles
    fn hosts(&self) -> &[&'static str];

    fn matches(&self, url: &str) -> bool {
        host_matches(url, self.hosts())
    }

    /// Resolve `url`; `ctx` is already the context of this hop
    async fn resolve(
        &self,
        url: &str,
        ctx: &ExtractionContext,
        fetcher: &dyn Fetcher,
    ) -> Result<Extraction, ResolveError>;
}

/// Extractors consulted by host, first match wins
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// An empty registry; every embed goes through the generic scan
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in extractors
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PackedPlayerExtractor));
        registry.register(Arc::new(DoodExtractor));
        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    pub fn find(&self, url: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.iter().find(|e| e.matches(url)).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.name().to_string()).collect()
    }
}

/// A media link with the headers a player needs to fetch it from `referer`
pub fn media_link(url: &str, label: Option<&str>, source_name: &str, referer: &str) -> ResolvedLink {
    let mut link = ResolvedLink::new(url, source_name)
        .with_label(label)
        .with_header("Referer", referer);
    if let Some(origin) = origin_of(referer) {
        link = link.with_header("Origin", origin);
    }
    link
}

/// Collect `file:` references from a player page, including packed scripts
pub fn scan_player_page(html: &str, page_url: &str, source_name: &str) -> Resolution {
    let mut resolution = Resolution::default();

    let mut texts = vec![html.to_string()];
    texts.extend(unpack_packed_scripts(html));

    for entry in texts.iter().flat_map(|text| find_file_entries(text)) {
        match ContainerType::classify(&entry.url) {
            ContainerType::Subtitle => {
                resolution.push_subtitle(SubtitleTrack::new(entry.label.unwrap_or_default(), entry.url));
            }
            _ => resolution.push_link(media_link(&entry.url, entry.label.as_deref(), source_name, page_url)),
        }
    }

    for track in extract_tracks(html) {
        if let Some(url) = normalize_url(&track.url, page_url) {
            resolution.push_subtitle(SubtitleTrack::new(track.language, url));
        }
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quality;

    #[test]
    fn test_registry_dispatch_by_host() {
        let registry = ExtractorRegistry::with_defaults();
        assert_eq!(registry.find("https://filemoon.sx/e/abc").map(|e| e.name().to_string()).as_deref(), Some("packed"));
        assert_eq!(registry.find("https://streamwish.to/e/abc").map(|e| e.name().to_string()).as_deref(), Some("packed"));
        assert_eq!(registry.find("https://dood.wf/e/abc").map(|e| e.name().to_string()).as_deref(), Some("dood"));
        assert!(registry.find("https://unknown.host/e/abc").is_none());
        assert!(ExtractorRegistry::new().find("https://dood.wf/e/abc").is_none());
        assert_eq!(registry.names(), vec!["packed", "dood"]);
    }

    #[test]
    fn test_media_link_headers() {
        let link = media_link("https://cdn/v-720p.mp4", None, "generic", "https://host.example/e/1");
        assert_eq!(link.quality, Quality::P720);
        assert_eq!(link.headers.get("Referer").map(String::as_str), Some("https://host.example/e/1"));
        assert_eq!(link.headers.get("Origin").map(String::as_str), Some("https://host.example"));
    }

    #[test]
    fn test_scan_player_page_splits_subtitles() {
        let html = r#"<script>player.setup({sources:[{file:"https://cdn/hls/master.m3u8",label:"1080p"}],
            tracks:[{file:"https://cdn/sub/id.vtt",label:"Indonesia",kind:"captions"}]});</script>"#;
        let resolution = scan_player_page(html, "https://host/e/1", "generic");
        assert_eq!(resolution.links.len(), 1);
        assert_eq!(resolution.links[0].container_type, ContainerType::Hls);
        assert_eq!(resolution.links[0].quality, Quality::P1080);
        assert_eq!(resolution.subtitles, vec![SubtitleTrack::new("Indonesia", "https://cdn/sub/id.vtt")]);
    }

    #[test]
    fn test_scan_player_page_empty() {
        assert!(scan_player_page("<html><body>nothing</body></html>", "https://host/e/1", "generic").is_empty());
    }
}
