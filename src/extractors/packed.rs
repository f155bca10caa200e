//! Hosts serving a JW Player setup hidden in a `p,a,c,k,e,d` packed script

use async_trait::async_trait;

use super::{scan_player_page, Extraction, Extractor};
use crate::error::ResolveError;
use crate::fetch::{FetchRequest, Fetcher};
use crate::models::ExtractionContext;
use crate::parser::iframe_sources;
use crate::urls::{is_noise, normalize_url};

const HOSTS: &[&str] = &[
    "filemoon",
    "moonplayer",
    "streamwish",
    "wishembed",
    "swdyu",
    "embedwish",
    "vidhide",
    "filelions",
    "streamhide",
];

/// Filemoon, StreamWish, VidHide and their mirror domains
pub struct PackedPlayerExtractor;

#[async_trait]
impl Extractor for PackedPlayerExtractor {
    fn name(&self) -> &str {
        "packed"
    }

    fn hosts(&self) -> &[&'static str] {
        HOSTS
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

        // filemoon wraps the player page in an iframe on its landing page
        let inner = iframe_sources(&page.html)
            .into_iter()
            .filter(|src| !is_noise(src))
            .find_map(|src| normalize_url(&src, &page.final_url));

        Ok(match inner {
            Some(target) => Extraction::Hop(target),
            None => Extraction::Done(resolution),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockFetcher;
    use crate::models::{ContainerType, Resolution};

    const PACKED_PAGE: &str = r#"<html><body><div id="player"></div>
        <script type="text/javascript">eval(function(p,a,c,k,e,d){while(c--)if(k[c])p=p.replace(new RegExp('\\b'+c.toString(a)+'\\b','g'),k[c]);return p}('0("1").2({3:[{4:"5://6.7/8/9.a"}]})',11,11,'jwplayer|vplayer|setup|sources|file|https|cdn|example|hls|master|m3u8'.split('|')))</script>
        </body></html>"#;

    #[tokio::test]
    async fn test_packed_player_unpacks_sources() {
        let fetcher = MockFetcher::new().page("https://filemoon.sx/e/abc", PACKED_PAGE);
        let ctx = ExtractionContext::new("https://site.test/ep").descend("https://filemoon.sx/e/abc");

        let result = PackedPlayerExtractor
            .resolve("https://filemoon.sx/e/abc", &ctx, &fetcher)
            .await
            .unwrap();
        let Extraction::Done(resolution) = result else {
            panic!("expected links");
        };
        assert_eq!(resolution.links.len(), 1);
        let link = &resolution.links[0];
        assert_eq!(link.url, "https://cdn.example/hls/master.m3u8");
        assert_eq!(link.container_type, ContainerType::Hls);
        assert_eq!(link.source_name, "packed");
        assert_eq!(link.headers.get("Referer").map(String::as_str), Some("https://filemoon.sx/e/abc"));
    }

    #[tokio::test]
    async fn test_packed_player_hops_into_inner_iframe() {
        let fetcher = MockFetcher::new().page(
            "https://filemoon.sx/d/abc",
            r#"<iframe src="about:blank"></iframe><iframe src="/e/abc"></iframe>"#,
        );
        let ctx = ExtractionContext::new("https://site.test/ep").descend("https://filemoon.sx/d/abc");

        let result = PackedPlayerExtractor
            .resolve("https://filemoon.sx/d/abc", &ctx, &fetcher)
            .await
            .unwrap();
        assert_eq!(result, Extraction::Hop("https://filemoon.sx/e/abc".to_string()));

        let empty = MockFetcher::new().page("https://vidhide.com/v/1", "<p>File was deleted</p>");
        let result = PackedPlayerExtractor
            .resolve("https://vidhide.com/v/1", &ctx, &empty)
            .await
            .unwrap();
        assert_eq!(result, Extraction::Done(Resolution::default()));
    }
}
