//! Locator module for finding source descriptors on a fetched page
//!
//! Each site is described by a `SiteProfile`: an ordered list of strategies
//! run by one generic engine. Strategies never fail; a selector that matches
//! nothing simply contributes no descriptors.

use futures::future::join_all;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::fetch::{FetchRequest, FetchedPage, Fetcher};
use crate::models::{Encoding, SiteSummary, SourceDescriptor, SourceKind, SubtitleTrack};
use crate::parser::{
    decode_base64_value, element_src, extract_balanced, extract_tracks, find_keyed_value,
    parse_lenient_json,
};
use crate::urls::{host_matches, normalize_url};

/// Declarative extraction rules for one site
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteProfile {
    /// Display name (e.g. "Samehadaku")
    pub name: String,
    /// Host substrings this profile applies to
    pub domains: Vec<String>,
    /// Strategies, run in order
    pub strategies: Vec<LocatorStrategy>,
    /// Preferred embed hosts, best first. Empty uses the resolver default.
    #[serde(default)]
    pub host_priority: Vec<String>,
}

impl SiteProfile {
    /// Profile used for pages no configured site claims
    pub fn generic() -> Self {
        Self {
            name: "generic".to_string(),
            domains: Vec::new(),
            strategies: vec![
                LocatorStrategy::DirectIframe {
                    selector: "iframe".to_string(),
                },
                LocatorStrategy::EmbeddedJson {
                    anchor: "sources".to_string(),
                    url_fields: default_url_fields(),
                    label_field: default_label_field(),
                    subtitle_field: default_subtitle_field(),
                },
            ],
            host_priority: Vec::new(),
        }
    }

    /// True when the page URL's host contains one of the profile's domains
    pub fn matches(&self, url: &str) -> bool {
        host_matches(url, &self.domains)
    }

    pub fn summary(&self) -> SiteSummary {
        SiteSummary {
            name: self.name.clone(),
            domains: self.domains.clone(),
            strategies: self.strategies.len(),
        }
    }
}

/// One way a site hides its sources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// Elements with a `src`/`data-src`/`data-litespeed-src` URL
    DirectIframe { selector: String },
    /// An attribute holding a base64 iframe fragment or URL
    Base64Attribute { selector: String, attribute: String },
    /// A JSON server list inside an inline script, found after `anchor`
    EmbeddedJson {
        anchor: String,
        #[serde(default = "default_url_fields")]
        url_fields: Vec<String>,
        #[serde(default = "default_label_field")]
        label_field: String,
        #[serde(default = "default_subtitle_field")]
        subtitle_field: String,
    },
    /// Server tabs whose iframe is returned by a POST to `endpoint`
    AjaxPlayer {
        selector: String,
        endpoint: String,
        fields: Vec<AjaxField>,
        /// Key of a nonce published in an inline script or script URL
        #[serde(default)]
        nonce_key: Option<String>,
    },
    /// Links to secondary player pages, located with the other strategies
    MirrorPage { selector: String },
}

/// A POST field of an ajax player call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AjaxField {
    pub name: String,
    pub source: FieldSource,
}

impl AjaxField {
    pub fn attribute(name: &str, attribute: &str) -> Self {
        Self {
            name: name.to_string(),
            source: FieldSource::Attribute(attribute.to_string()),
        }
    }

    pub fn literal(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            source: FieldSource::Literal(value.to_string()),
        }
    }

    pub fn nonce(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source: FieldSource::Nonce,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Read from the server element
    Attribute(String),
    Literal(String),
    /// The nonce found through `nonce_key`
    Nonce,
}

fn default_url_fields() -> Vec<String> {
    vec!["file".to_string(), "url".to_string()]
}

fn default_label_field() -> String {
    "label".to_string()
}

fn default_subtitle_field() -> String {
    "subtitle_url".to_string()
}

/// Descriptors and page-level subtitles found on a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Located {
    pub descriptors: Vec<SourceDescriptor>,
    pub subtitles: Vec<SubtitleTrack>,
}

impl Located {
    fn push(&mut self, descriptor: SourceDescriptor) {
        let duplicate = self.descriptors.iter().any(|d| {
            d.kind == descriptor.kind && d.raw_value == descriptor.raw_value && d.form == descriptor.form
        });
        if !duplicate {
            self.descriptors.push(descriptor);
        }
    }

    fn push_subtitle(&mut self, track: SubtitleTrack) {
        if !self.subtitles.iter().any(|t| t.url == track.url) {
            self.subtitles.push(track);
        }
    }

    fn merge(&mut self, other: Located) {
        for descriptor in other.descriptors {
            self.push(descriptor);
        }
        for track in other.subtitles {
            self.push_subtitle(track);
        }
    }
}

/// Runs a profile's strategies against pages
pub struct Locator<'a> {
    fetcher: &'a dyn Fetcher,
}

impl<'a> Locator<'a> {
    pub fn new(fetcher: &'a dyn Fetcher) -> Self {
        Self { fetcher }
    }

    /// Locate and rank the descriptors on `page`
    pub async fn locate(&self, page: &FetchedPage, profile: &SiteProfile, priority: &[String]) -> Located {
        let (mut located, mirrors) = locate_in_document(&page.html, &page.final_url, &profile.strategies);

        if !mirrors.is_empty() {
            let secondary: Vec<LocatorStrategy> = profile
                .strategies
                .iter()
                .filter(|s| !matches!(s, LocatorStrategy::MirrorPage { .. }))
                .cloned()
                .collect();

            let request = FetchRequest::get(Some(&page.final_url));
            let fetches = mirrors.iter().map(|url| self.fetcher.fetch(url, &request));
            for (url, result) in mirrors.iter().zip(join_all(fetches).await) {
                match result {
                    Ok(mirror) => {
                        let (mut found, _) = locate_in_document(&mirror.html, &mirror.final_url, &secondary);
                        debug!("Mirror page {} yielded {} descriptors", url, found.descriptors.len());
                        found.descriptors = found
                            .descriptors
                            .into_iter()
                            .map(|d| d.with_found_on(mirror.final_url.as_str()))
                            .collect();
                        located.merge(found);
                    }
                    Err(e) => warn!("Failed to fetch mirror page {}: {}", url, e),
                }
            }
        }

        located.descriptors = rank_descriptors(located.descriptors, priority);
        located
    }
}

/// Run the non-fetching strategies over one document.
///
/// Returns what was found plus the absolute URLs of mirror pages to follow.
pub fn locate_in_document(
    html: &str,
    base_url: &str,
    strategies: &[LocatorStrategy],
) -> (Located, Vec<String>) {
    let document = Html::parse_document(html);
    let mut located = Located::default();
    let mut mirrors = Vec::new();

    for strategy in strategies {
        match strategy {
            LocatorStrategy::DirectIframe { selector } => {
                for el in select_all(&document, selector) {
                    if let Some(src) = element_src(&el) {
                        located.push(SourceDescriptor::iframe(src));
                    }
                }
            }
            LocatorStrategy::Base64Attribute { selector, attribute } => {
                for el in select_all(&document, selector) {
                    match el.value().attr(attribute).map(str::trim) {
                        Some(value) if !value.is_empty() => {
                            located.push(SourceDescriptor::base64(value).with_label(element_text(&el)));
                        }
                        _ => {}
                    }
                }
            }
            LocatorStrategy::EmbeddedJson {
                anchor,
                url_fields,
                label_field,
                subtitle_field,
            } => {
                let fields = JsonFields {
                    url_fields,
                    label_field,
                    subtitle_field,
                };
                for script in script_texts(&document).iter().filter(|s| s.contains(anchor.as_str())) {
                    let Some(json) = extract_balanced(script, anchor) else {
                        continue;
                    };
                    match parse_lenient_json(json) {
                        Ok(value) => flatten_json_sources(&value, &fields, &mut located),
                        Err(e) => debug!("Unparsable server list after {:?}: {}", anchor, e),
                    }
                }
            }
            LocatorStrategy::AjaxPlayer {
                selector,
                endpoint,
                fields,
                nonce_key,
            } => {
                let Some(endpoint) = normalize_url(endpoint, base_url) else {
                    warn!("Invalid ajax endpoint {:?} for {}", endpoint, base_url);
                    continue;
                };
                let nonce = nonce_key.as_deref().and_then(|key| find_nonce(&document, key));

                for el in select_all(&document, selector) {
                    if let Some(form) = build_form(&el, fields, nonce.as_deref()) {
                        located.push(SourceDescriptor::ajax(endpoint.clone(), form).with_label(element_text(&el)));
                    }
                }
            }
            LocatorStrategy::MirrorPage { selector } => {
                for el in select_all(&document, selector) {
                    let href = el.value().attr("href").or_else(|| el.value().attr("data-href"));
                    if let Some(url) = href.and_then(|h| normalize_url(h, base_url)) {
                        if url != base_url && !mirrors.contains(&url) {
                            mirrors.push(url);
                        }
                    }
                }
            }
        }
    }

    for track in extract_tracks(html) {
        if let Some(url) = normalize_url(&track.url, base_url) {
            located.push_subtitle(SubtitleTrack::new(track.language, url));
        }
    }

    (located, mirrors)
}

/// Stable sort by host priority; unmatched descriptors go last
pub fn rank_descriptors(descriptors: Vec<SourceDescriptor>, priority: &[String]) -> Vec<SourceDescriptor> {
    if priority.is_empty() {
        return descriptors;
    }

    let mut ranked: Vec<(usize, SourceDescriptor)> = descriptors
        .into_iter()
        .map(|d| {
            let hint = host_hint(&d);
            let rank = priority
                .iter()
                .position(|p| !p.is_empty() && hint.contains(&p.to_lowercase()))
                .unwrap_or(priority.len());
            (rank, d)
        })
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);
    ranked.into_iter().map(|(_, d)| d).collect()
}

/// Lowercased text that identifies where a descriptor leads
fn host_hint(descriptor: &SourceDescriptor) -> String {
    let mut hint = match (descriptor.kind, descriptor.encoding) {
        (SourceKind::AjaxTrigger, _) => String::new(),
        (_, Encoding::Base64) => decode_base64_value(&descriptor.raw_value).unwrap_or_default(),
        _ => descriptor.raw_value.clone(),
    };
    if let Some(label) = &descriptor.label {
        hint.push(' ');
        hint.push_str(label);
    }
    hint.to_lowercase()
}

fn select_all<'d>(document: &'d Html, selector: &str) -> Vec<ElementRef<'d>> {
    match Selector::parse(selector) {
        Ok(parsed) => document.select(&parsed).collect(),
        Err(e) => {
            warn!("Invalid selector {:?}: {}", selector, e);
            Vec::new()
        }
    }
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>()
}

fn script_texts(document: &Html) -> Vec<String> {
    match Selector::parse("script") {
        Ok(selector) => document
            .select(&selector)
            .map(|el| el.text().collect::<String>())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn find_nonce(document: &Html, key: &str) -> Option<String> {
    let selector = Selector::parse("script").ok()?;
    document.select(&selector).find_map(|el| {
        let inline = el.text().collect::<String>();
        find_keyed_value(&inline, key).or_else(|| el.value().attr("src").and_then(|src| find_keyed_value(src, key)))
    })
}

fn build_form(el: &ElementRef, fields: &[AjaxField], nonce: Option<&str>) -> Option<Vec<(String, String)>> {
    fields
        .iter()
        .map(|field| {
            let value = match &field.source {
                FieldSource::Attribute(attr) => el.value().attr(attr)?.to_string(),
                FieldSource::Literal(value) => value.clone(),
                FieldSource::Nonce => nonce?.to_string(),
            };
            Some((field.name.clone(), value))
        })
        .collect()
}

struct JsonFields<'f> {
    url_fields: &'f [String],
    label_field: &'f str,
    subtitle_field: &'f str,
}

fn flatten_json_sources(value: &Value, fields: &JsonFields, located: &mut Located) {
    match value {
        Value::Array(items) => {
            for item in items {
                flatten_json_sources(item, fields, located);
            }
        }
        Value::String(url) if !url.trim().is_empty() => {
            located.push(SourceDescriptor::direct_file(url.trim(), Encoding::EmbeddedJson));
        }
        Value::Object(map) => {
            let label = map.get(fields.label_field).and_then(Value::as_str).unwrap_or_default();

            if let Some(subtitle) = map.get(fields.subtitle_field).and_then(Value::as_str) {
                if !subtitle.trim().is_empty() {
                    located.push_subtitle(SubtitleTrack::new(label, subtitle.trim()));
                }
            }

            let url = fields
                .url_fields
                .iter()
                .find_map(|f| map.get(f.as_str()).and_then(Value::as_str))
                .map(str::trim)
                .filter(|u| !u.is_empty());

            match url {
                Some(url) => {
                    let is_caption = map
                        .get("kind")
                        .and_then(Value::as_str)
                        .is_some_and(|k| k.eq_ignore_ascii_case("captions") || k.eq_ignore_ascii_case("subtitles"));
                    if is_caption {
                        located.push_subtitle(SubtitleTrack::new(label, url));
                    } else {
                        located.push(SourceDescriptor::direct_file(url, Encoding::EmbeddedJson).with_label(label));
                    }
                }
                // nested lists such as {"links": [...]}
                None => {
                    for nested in map.values().filter(|v| v.is_array() || v.is_object()) {
                        flatten_json_sources(nested, fields, located);
                    }
                }
            }
        }
        _ => {}
    }
}
