//! Fallback for embed hosts without a dedicated extractor

use async_trait::async_trait;
use tracing::debug;

use super::{scan_player_page, Extraction, Extractor};
use crate::error::ResolveError;
use crate::fetch::{FetchRequest, Fetcher};
use crate::models::{ExtractionContext, Resolution};
use crate::parser::{iframe_sources, location_redirect_target, meta_refresh_target};
use crate::urls::{is_noise, normalize_url};

/// Scans the embed page for `file:` references; when there are none, follows
/// a meta refresh, a `location.href` assignment, or a nested iframe.
pub struct GenericExtractor;

#[async_trait]
impl Extractor for GenericExtractor {
    fn name(&self) -> &str {
        "generic"
    }

    fn hosts(&self) -> &[&'static str] {
        &[]
    }

    async fn resolve(
        &self,
        url: &str,
        ctx: &ExtractionContext,
        fetcher: &dyn Fetcher,
    ) -> Result<Extraction, ResolveError> {
        let page = fetcher.fetch(url, &FetchRequest::get(ctx.referer.as_deref())).await?;

        let resolution = scan_player_page(&page.html, &page.final_url, self.name());
        if resolution.is_success() {
            return Ok(Extraction::Done(resolution));
        }

        let redirect = meta_refresh_target(&page.html)
            .or_else(|| location_redirect_target(&page.html))
            .or_else(|| iframe_sources(&page.html).into_iter().find(|src| !is_noise(src)));

        match redirect.and_then(|target| normalize_url(&target, &page.final_url)) {
            Some(target) => {
                debug!("{} forwards to {}", page.final_url, target);
                Ok(Extraction::Hop(target))
            }
            None => Ok(Extraction::Done(Resolution {
                links: Vec::new(),
                subtitles: resolution.subtitles,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockFetcher;

    fn ctx(url: &str) -> ExtractionContext {
        ExtractionContext::new("https://site.test/ep").descend(url)
    }

    #[tokio::test]
    async fn test_generic_finds_file_reference() {
        let fetcher = MockFetcher::new().page(
            "https://host/embed/x",
            r#"<script>var player = new Playerjs({id:"p", file:"https://cdn/x-480p.mp4"});</script>"#,
        );
        let result = GenericExtractor
            .resolve("https://host/embed/x", &ctx("https://host/embed/x"), &fetcher)
            .await
            .unwrap();
        match result {
            Extraction::Done(resolution) => {
                assert_eq!(resolution.links.len(), 1);
                assert_eq!(resolution.links[0].url, "https://cdn/x-480p.mp4");
                assert_eq!(resolution.links[0].source_name, "generic");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generic_redirect_sources_in_order() {
        let fetcher = MockFetcher::new()
            .page(
                "https://host/a",
                r#"<head><meta http-equiv="refresh" content="0;url=/b"></head>
                   <script>location.href = "https://elsewhere/c";</script>"#,
            )
            .page("https://host/d", r#"<script>window.location.href = '/e';</script><iframe src="/f"></iframe>"#)
            .page("https://host/g", r#"<iframe src="about:blank"></iframe><iframe src="/h"></iframe>"#)
            .page("https://host/i", r#"<iframe src="https://www.youtube.com/embed/trailer"></iframe>"#);

        let hop = GenericExtractor.resolve("https://host/a", &ctx("https://host/a"), &fetcher).await.unwrap();
        assert_eq!(hop, Extraction::Hop("https://host/b".to_string()));

        let hop = GenericExtractor.resolve("https://host/d", &ctx("https://host/d"), &fetcher).await.unwrap();
        assert_eq!(hop, Extraction::Hop("https://host/e".to_string()));

        let hop = GenericExtractor.resolve("https://host/g", &ctx("https://host/g"), &fetcher).await.unwrap();
        assert_eq!(hop, Extraction::Hop("https://host/h".to_string()));

        let done = GenericExtractor.resolve("https://host/i", &ctx("https://host/i"), &fetcher).await.unwrap();
        assert_eq!(done, Extraction::Done(Resolution::default()));
    }

    #[tokio::test]
    async fn test_generic_fetch_error_propagates() {
        let fetcher = MockFetcher::new();
        let result = GenericExtractor.resolve("https://down/e", &ctx("https://down/e"), &fetcher).await;
        assert!(matches!(result, Err(ResolveError::Fetch(_))));
    }
}
