//! Link resolver: turns a page URL into playable media links
//!
//! Every descriptor found by the locator is resolved concurrently. A branch
//! may decode a base64 payload, post an ajax form, or follow embed pages
//! through the extractor registry, bounded by a depth ceiling. Branch
//! failures are logged and contribute nothing; `resolve_links` never fails.

use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{NoopCache, ResolutionCache};
use crate::constants::{hosts::DEFAULT_HOST_PRIORITY, sites};
use crate::error::ResolveError;
use crate::extractors::{media_link, Extraction, Extractor, ExtractorRegistry, GenericExtractor};
use crate::fetch::{FetchRequest, Fetcher};
use crate::locator::{Locator, SiteProfile};
use crate::models::{
    ContainerType, Encoding, ExtractionContext, Resolution, SourceDescriptor, SourceKind, SubtitleTrack,
};
use crate::parser::{decode_base64_value, extract_embed_src};
use crate::urls::{is_media_url, is_noise, normalize_url};

/// Default number of hops allowed below the entry page
pub const DEFAULT_MAX_DEPTH: u8 = 3;

/// JSON keys an ajax player response may carry its embed in, in order
const AJAX_EMBED_KEYS: &[&str] = &["embed_url", "url", "html", "data", "iframe"];

pub struct LinkResolver {
    fetcher: Arc<dyn Fetcher>,
    registry: ExtractorRegistry,
    generic: GenericExtractor,
    cache: Arc<dyn ResolutionCache>,
    profiles: Vec<SiteProfile>,
    generic_profile: SiteProfile,
    default_priority: Vec<String>,
    max_depth: u8,
    user_agent: Option<String>,
}

impl LinkResolver {
    /// Resolver with the built-in sites and extractors and no cache
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            registry: ExtractorRegistry::with_defaults(),
            generic: GenericExtractor,
            cache: Arc::new(NoopCache),
            profiles: sites::builtin(),
            generic_profile: SiteProfile::generic(),
            default_priority: DEFAULT_HOST_PRIORITY.iter().map(|h| h.to_string()).collect(),
            max_depth: DEFAULT_MAX_DEPTH,
            user_agent: None,
        }
    }

    pub fn with_registry(mut self, registry: ExtractorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResolutionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the site profiles
    pub fn with_profiles(mut self, profiles: Vec<SiteProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_max_depth(mut self, max_depth: u8) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// User-Agent attached to every emitted link
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent.filter(|ua| !ua.trim().is_empty());
        self
    }

    /// Host priority used by profiles that declare none
    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        self.default_priority = priority;
        self
    }

    /// Profile claiming `url`, or the generic one
    pub fn profile_for(&self, url: &str) -> &SiteProfile {
        self.profiles
            .iter()
            .find(|p| p.matches(url))
            .unwrap_or(&self.generic_profile)
    }

    pub fn profile_named(&self, name: &str) -> Option<&SiteProfile> {
        if name.eq_ignore_ascii_case(&self.generic_profile.name) {
            return Some(&self.generic_profile);
        }
        self.profiles.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn profiles(&self) -> &[SiteProfile] {
        &self.profiles
    }

    pub fn cache(&self) -> &Arc<dyn ResolutionCache> {
        &self.cache
    }

    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Resolve a page with the profile matching its host
    pub async fn resolve_links(&self, page_url: &str, ctx: ExtractionContext) -> Resolution {
        let profile = self.profile_for(page_url);
        self.resolve_with_profile(page_url, ctx, profile).await
    }

    /// Resolve a page with an explicit profile
    pub async fn resolve_with_profile(
        &self,
        page_url: &str,
        ctx: ExtractionContext,
        profile: &SiteProfile,
    ) -> Resolution {
        if let Some(cached) = self.cache.get(page_url) {
            debug!("Cache hit for {}", page_url);
            return (*cached).clone();
        }

        let page = match self
            .fetcher
            .fetch(page_url, &FetchRequest::get(ctx.referer.as_deref()))
            .await
        {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to fetch page {}: {}", page_url, e);
                return Resolution::default();
            }
        };

        // relative sources resolve against where redirects landed
        let ctx = ExtractionContext {
            page_url: page.final_url.clone(),
            ..ctx
        };

        let priority = if profile.host_priority.is_empty() {
            &self.default_priority
        } else {
            &profile.host_priority
        };
        let located = Locator::new(self.fetcher.as_ref()).locate(&page, profile, priority).await;
        info!(
            "Located {} sources on {} using profile {}",
            located.descriptors.len(),
            page.final_url,
            profile.name
        );

        let branches = located
            .descriptors
            .iter()
            .map(|descriptor| self.resolve_descriptor(descriptor, &ctx, &profile.name));
        let results = join_all(branches).await;

        let mut resolution = Resolution::default();
        for (descriptor, result) in located.descriptors.iter().zip(results) {
            match result {
                Ok(branch) => resolution.merge(branch),
                Err(e) => log_branch_failure(descriptor, &e),
            }
        }
        for track in located.subtitles {
            resolution.push_subtitle(track);
        }

        if let Some(user_agent) = &self.user_agent {
            for link in &mut resolution.links {
                link.headers.insert("User-Agent".to_string(), user_agent.clone());
            }
        }

        info!(
            "Resolved {} links and {} subtitles for {}",
            resolution.links.len(),
            resolution.subtitles.len(),
            page_url
        );
        if resolution.is_success() {
            self.cache.put(page_url, resolution.clone());
        }
        resolution
    }

    async fn resolve_descriptor(
        &self,
        descriptor: &SourceDescriptor,
        ctx: &ExtractionContext,
        site: &str,
    ) -> Result<Resolution, ResolveError> {
        // mirror sources resolve against, and are referred by, their own page
        let ctx = &match &descriptor.found_on {
            Some(page) => ExtractionContext {
                page_url: page.clone(),
                referer: Some(ctx.page_url.clone()),
                depth: ctx.depth,
            },
            None => ctx.clone(),
        };

        match descriptor.kind {
            SourceKind::DirectFile => direct_resolution(&descriptor.raw_value, descriptor.label.as_deref(), ctx, site),
            SourceKind::Iframe => {
                let target = match descriptor.encoding {
                    Encoding::Base64 => decode_embed_payload(&descriptor.raw_value)?,
                    _ => Some(descriptor.raw_value.clone()),
                };
                match target {
                    Some(target) => {
                        self.resolve_embed(target, descriptor.label.clone(), ctx.clone(), site)
                            .await
                    }
                    None => Ok(Resolution::default()),
                }
            }
            SourceKind::AjaxTrigger => self.resolve_ajax(descriptor, ctx, site).await,
        }
    }

    /// Follow an embed URL until it yields media, stops, or hits the ceiling
    fn resolve_embed<'a>(
        &'a self,
        url: String,
        label: Option<String>,
        ctx: ExtractionContext,
        site: &'a str,
    ) -> BoxFuture<'a, Result<Resolution, ResolveError>> {
        async move {
            if is_noise(&url) {
                return Ok(Resolution::default());
            }
            let target = normalize_url(&url, &ctx.page_url).ok_or_else(|| ResolveError::InvalidUrl(url.clone()))?;
            if is_media_url(&target) {
                return direct_resolution(&target, label.as_deref(), &ctx, site);
            }

            let next = ctx.descend(target.as_str());
            if next.depth > self.max_depth {
                return Err(ResolveError::DepthExceeded {
                    url: target,
                    depth: next.depth,
                });
            }

            let extraction = match self.registry.find(&target) {
                Some(extractor) => {
                    debug!("{} handles {}", extractor.name(), target);
                    extractor.resolve(&target, &next, self.fetcher.as_ref()).await?
                }
                None => self.generic.resolve(&target, &next, self.fetcher.as_ref()).await?,
            };

            match extraction {
                Extraction::Done(mut resolution) => {
                    resolution.links = resolution
                        .links
                        .into_iter()
                        .map(|link| match link.label {
                            Some(_) => link,
                            None => link.with_label(label.as_deref()),
                        })
                        .collect();
                    Ok(resolution)
                }
                Extraction::Hop(hop) => self.resolve_embed(hop, label, next, site).await,
            }
        }
        .boxed()
    }

    async fn resolve_ajax(
        &self,
        descriptor: &SourceDescriptor,
        ctx: &ExtractionContext,
        site: &str,
    ) -> Result<Resolution, ResolveError> {
        let request = FetchRequest::post_form(Some(&ctx.page_url), descriptor.form.clone())
            .header("X-Requested-With", "XMLHttpRequest");
        let response = self.fetcher.fetch(&descriptor.raw_value, &request).await?;

        match ajax_embed_target(&response.html)? {
            Some(target) => {
                self.resolve_embed(target, descriptor.label.clone(), ctx.clone(), site)
                    .await
            }
            None => {
                debug!("Ajax player at {} returned no embed", descriptor.raw_value);
                Ok(Resolution::default())
            }
        }
    }
}

/// Emit a terminal media URL found on `ctx.page_url`
fn direct_resolution(
    url: &str,
    label: Option<&str>,
    ctx: &ExtractionContext,
    source_name: &str,
) -> Result<Resolution, ResolveError> {
    let url = normalize_url(url, &ctx.page_url).ok_or_else(|| ResolveError::InvalidUrl(url.to_string()))?;

    let mut resolution = Resolution::default();
    match ContainerType::classify(&url) {
        ContainerType::Subtitle => resolution.push_subtitle(SubtitleTrack::new(label.unwrap_or_default(), url)),
        _ => resolution.push_link(media_link(&url, label, source_name, &ctx.page_url)),
    }
    Ok(resolution)
}

/// Decode a base64 source: either an HTML fragment or a bare URL.
///
/// A fragment without any embed element is not an error; it yields None.
fn decode_embed_payload(raw: &str) -> Result<Option<String>, ResolveError> {
    let decoded = decode_base64_value(raw)
        .ok_or_else(|| ResolveError::Decode(format!("invalid base64 payload {:?}", truncate(raw, 40))))?;
    let decoded = decoded.trim();

    if decoded.contains('<') {
        Ok(extract_embed_src(decoded))
    } else if decoded.is_empty() {
        Ok(None)
    } else {
        Ok(Some(decoded.to_string()))
    }
}

/// Embed URL from an ajax player response, JSON or HTML
fn ajax_embed_target(body: &str) -> Result<Option<String>, ResolveError> {
    let body = body.trim();
    if !body.starts_with(['{', '[']) {
        return Ok(extract_embed_src(body));
    }

    let value: Value = serde_json::from_str(body)?;
    let embed = AJAX_EMBED_KEYS
        .iter()
        .filter_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty());

    Ok(match embed {
        Some(embed) if embed.contains('<') => extract_embed_src(embed),
        Some(embed) => Some(embed.to_string()),
        None => None,
    })
}

fn log_branch_failure(descriptor: &SourceDescriptor, err: &ResolveError) {
    let source = truncate(&descriptor.raw_value, 80);
    match err {
        ResolveError::DepthExceeded { .. } => warn!("Depth ceiling reached for source {}: {}", source, err),
        ResolveError::Decode(_) | ResolveError::Fetch(_) => {
            warn!(kind = err.kind(), "Dropping source {}: {}", source, err)
        }
        ResolveError::Json(_) | ResolveError::InvalidUrl(_) => {
            debug!(kind = err.kind(), "Dropping source {}: {}", source, err)
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
