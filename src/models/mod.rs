//! Data models for the Stream Resolver
//!
//! This module contains the descriptors produced by the locator, the links and
//! subtitle tracks produced by the resolver, and the API envelopes returned by
//! the HTTP service.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use utoipa::ToSchema;

/// How the raw value of a descriptor is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    None,
    Base64,
    EmbeddedJson,
}

/// What a descriptor points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// An embed page that needs further resolution
    Iframe,
    /// A player tab whose iframe is only returned by a POST
    AjaxTrigger,
    /// A media file URL, terminal
    DirectFile,
}

/// An unresolved reference to a possible video source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// URL, encoded payload, or ajax endpoint depending on `kind`
    pub raw_value: String,
    pub encoding: Encoding,
    pub kind: SourceKind,
    /// Server or tab name as shown by the site
    pub label: Option<String>,
    /// POST fields, only populated for `AjaxTrigger`
    pub form: Vec<(String, String)>,
    /// Secondary page the descriptor was found on; None for the entry page
    pub found_on: Option<String>,
}

impl SourceDescriptor {
    /// A plain iframe URL
    pub fn iframe(url: impl Into<String>) -> Self {
        Self {
            raw_value: url.into(),
            encoding: Encoding::None,
            kind: SourceKind::Iframe,
            label: None,
            form: Vec::new(),
            found_on: None,
        }
    }

    /// A base64 payload decoding to an iframe fragment or URL
    pub fn base64(payload: impl Into<String>) -> Self {
        Self {
            raw_value: payload.into(),
            encoding: Encoding::Base64,
            kind: SourceKind::Iframe,
            label: None,
            form: Vec::new(),
            found_on: None,
        }
    }

    /// A media file URL
    pub fn direct_file(url: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            raw_value: url.into(),
            encoding,
            kind: SourceKind::DirectFile,
            label: None,
            form: Vec::new(),
            found_on: None,
        }
    }

    /// An ajax player call against an absolute endpoint
    pub fn ajax(endpoint: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            raw_value: endpoint.into(),
            encoding: Encoding::None,
            kind: SourceKind::AjaxTrigger,
            label: None,
            form,
            found_on: None,
        }
    }

    /// Mark the descriptor as coming from a mirror page
    pub fn with_found_on(mut self, page_url: impl Into<String>) -> Self {
        self.found_on = Some(page_url.into());
        self
    }

    /// Attach a label, ignoring blank text
    pub fn with_label(mut self, label: impl AsRef<str>) -> Self {
        let label = label.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
        if !label.is_empty() {
            self.label = Some(label);
        }
        self
    }
}

/// Vertical resolution of a stream
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
pub enum Quality {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "2160p")]
    P2160,
}

impl Quality {
    /// Infer the quality from resolution tokens in a URL or label.
    ///
    /// Tokens are tested from highest to lowest, so the first match wins.
    pub fn infer(text: &str) -> Self {
        if text.contains("2160") {
            Quality::P2160
        } else if text.contains("1080") {
            Quality::P1080
        } else if text.contains("720") {
            Quality::P720
        } else if text.contains("480") {
            Quality::P480
        } else {
            Quality::Unknown
        }
    }
}

/// Container of a resolved media URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    Video,
    /// HLS playlist (m3u8)
    Hls,
    Subtitle,
}

impl ContainerType {
    /// Classify a URL by extension or substring
    pub fn classify(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.contains(".m3u8") {
            return ContainerType::Hls;
        }

        let path = lower.split(['?', '#']).next().unwrap_or("");
        if [".vtt", ".srt", ".ass"].iter().any(|ext| path.ends_with(ext)) {
            ContainerType::Subtitle
        } else {
            ContainerType::Video
        }
    }
}

/// A playable media link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLink {
    /// Absolute media URL
    pub url: String,
    /// Server or tab label from the source page
    pub label: Option<String>,
    pub quality: Quality,
    pub container_type: ContainerType,
    /// Headers the player must send (Referer, Origin, User-Agent)
    pub headers: BTreeMap<String, String>,
    /// Extractor or site the link came from
    pub source_name: String,
}

impl ResolvedLink {
    /// Build a link, classifying the container and inferring quality from the URL
    pub fn new(url: impl Into<String>, source_name: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            quality: Quality::infer(&url),
            container_type: ContainerType::classify(&url),
            url,
            label: None,
            headers: BTreeMap::new(),
            source_name: source_name.into(),
        }
    }

    /// Attach a label; when the URL carried no quality token the label's is used
    pub fn with_label(mut self, label: Option<&str>) -> Self {
        if let Some(label) = label.filter(|l| !l.trim().is_empty()) {
            if self.quality == Quality::Unknown {
                self.quality = Quality::infer(label);
            }
            self.label = Some(label.trim().to_string());
        }
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A caption track exposed by a page or player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleTrack {
    pub language: String,
    pub url: String,
}

impl SubtitleTrack {
    pub fn new(language: impl Into<String>, url: impl Into<String>) -> Self {
        let language = language.into();
        Self {
            language: if language.trim().is_empty() {
                "und".to_string()
            } else {
                language.trim().to_string()
            },
            url: url.into(),
        }
    }
}

/// Threaded through every hop of a resolution chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionContext {
    /// Page currently being resolved
    pub page_url: String,
    /// Page that led here, sent as Referer
    pub referer: Option<String>,
    /// Number of hops taken from the entry page
    pub depth: u8,
}

impl ExtractionContext {
    /// Context for an entry page (depth 0)
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
            referer: None,
            depth: 0,
        }
    }

    pub fn with_referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    /// Context for the next hop. The current page becomes the referer.
    pub fn descend(&self, next_url: impl Into<String>) -> Self {
        Self {
            page_url: next_url.into(),
            referer: Some(self.page_url.clone()),
            depth: self.depth.saturating_add(1),
        }
    }
}

/// Links and subtitles produced for one page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub links: Vec<ResolvedLink>,
    pub subtitles: Vec<SubtitleTrack>,
}

impl Resolution {
    /// A page resolution succeeds iff at least one link was found
    pub fn is_success(&self) -> bool {
        !self.links.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.subtitles.is_empty()
    }

    pub fn push_link(&mut self, link: ResolvedLink) {
        if !self.links.iter().any(|l| l.url == link.url) {
            self.links.push(link);
        }
    }

    pub fn push_subtitle(&mut self, track: SubtitleTrack) {
        if !self.subtitles.iter().any(|t| t.url == track.url) {
            self.subtitles.push(track);
        }
    }

    /// Append another resolution, keeping order and dropping duplicate URLs
    pub fn merge(&mut self, other: Resolution) {
        let mut seen: HashSet<String> = self.links.iter().map(|l| l.url.clone()).collect();
        for link in other.links {
            if seen.insert(link.url.clone()) {
                self.links.push(link);
            }
        }
        for track in other.subtitles {
            self.push_subtitle(track);
        }
    }
}

/// Request body for the resolve endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    /// Absolute URL of the detail or episode page
    pub url: String,
    /// Referer to send with the first fetch
    pub referer: Option<String>,
    /// Site profile name, picked by host when absent
    pub site: Option<String>,
}

/// Response payload of the resolve endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub page_url: String,
    /// True when at least one playable link was found
    pub found: bool,
    pub links: Vec<ResolvedLink>,
    pub subtitles: Vec<SubtitleTrack>,
}

impl ResolveResponse {
    pub fn new(page_url: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            page_url: page_url.into(),
            found: resolution.is_success(),
            links: resolution.links,
            subtitles: resolution.subtitles,
        }
    }
}

/// Summary of a configured site profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SiteSummary {
    pub name: String,
    pub domains: Vec<String>,
    pub strategies: usize,
}

/// Generic API response wrapper for successful responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Whether the operation was successful (always true for this type)
    pub success: bool,
    /// The response payload
    pub data: T,
    /// ISO timestamp of when the response was built
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    /// Create a new successful API response with the current timestamp
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Whether the operation was successful (always false for errors)
    pub success: bool,
    /// Error message describing what went wrong
    pub error: String,
    /// ISO timestamp of when the error occurred
    pub timestamp: String,
}

impl ApiError {
    /// Create a new API error response with the current timestamp
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}
