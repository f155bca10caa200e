//! DoodStream and its rotating mirror domains

use async_trait::async_trait;
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::{Extraction, Extractor};
use crate::error::ResolveError;
use crate::fetch::{FetchRequest, Fetcher};
use crate::models::{ExtractionContext, Quality, Resolution, ResolvedLink};
use crate::urls::origin_of;

static PASS_MD5: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"/pass_md5/[^'"\s]+"#).unwrap());

const HOSTS: &[&str] = &[
    "dood",
    "ds2play",
    "ds2video",
    "d0000d",
    "d000d",
    "dooood",
];

/// Length of the random suffix appended to the pass_md5 prefix
const TOKEN_SUFFIX_LEN: usize = 10;

pub struct DoodExtractor;

#[async_trait]
impl Extractor for DoodExtractor {
    fn name(&self) -> &str {
        "dood"
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
        // download pages (/d/) carry no player
        let embed_url = url.replacen("/d/", "/e/", 1);
        let page = fetcher
            .fetch(&embed_url, &FetchRequest::get(ctx.referer.as_deref()))
            .await?;

        let pass_path = PASS_MD5
            .find(&page.html)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ResolveError::Decode(format!("no pass_md5 call on {}", page.final_url)))?;
        let origin = origin_of(&page.final_url).ok_or_else(|| ResolveError::InvalidUrl(page.final_url.clone()))?;

        let pass = fetcher
            .fetch(&format!("{origin}{pass_path}"), &FetchRequest::get(Some(&page.final_url)))
            .await?;
        let prefix = pass.html.trim();
        if !prefix.starts_with("http") {
            return Err(ResolveError::Decode(format!("unexpected pass_md5 response from {}", origin)));
        }

        let token = pass_path.rsplit('/').next().unwrap_or_default();
        let media_url = build_media_url(prefix, token, Utc::now().timestamp_millis());
        debug!("dood resolved {} via {}", embed_url, pass_path);

        let mut link = ResolvedLink::new(media_url, self.name()).with_header("Referer", format!("{origin}/"));
        // the random suffix may contain digits that look like a resolution
        link.quality = Quality::infer(prefix);

        let mut resolution = Resolution::default();
        resolution.push_link(link);
        Ok(Extraction::Done(resolution))
    }
}

fn build_media_url(prefix: &str, token: &str, expiry_millis: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}{suffix}?token={token}&expiry={expiry_millis}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::MockFetcher;
    use crate::fetch::Method;

    const EMBED_PAGE: &str = r#"<html><script>
        $.get('/pass_md5/48213-77-1/k9x2hq', function(data) { makePlay(data); });
        </script></html>"#;

    fn ctx() -> ExtractionContext {
        ExtractionContext::new("https://site.test/ep").descend("https://dood.wf/e/k9x2hq")
    }

    #[tokio::test]
    async fn test_dood_builds_tokenized_url() {
        let fetcher = MockFetcher::new()
            .page("https://dood.wf/e/k9x2hq", EMBED_PAGE)
            .page("https://dood.wf/pass_md5/48213-77-1/k9x2hq", "https://c2.dood.video/u5kj/720p~\n");

        let result = DoodExtractor
            .resolve("https://dood.wf/d/k9x2hq", &ctx(), &fetcher)
            .await
            .unwrap();
        let Extraction::Done(resolution) = result else {
            panic!("expected links");
        };
        assert_eq!(resolution.links.len(), 1);

        let link = &resolution.links[0];
        let rest = link.url.strip_prefix("https://c2.dood.video/u5kj/720p~").unwrap();
        let (suffix, query) = rest.split_once('?').unwrap();
        assert_eq!(suffix.len(), TOKEN_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(query.starts_with("token=k9x2hq&expiry="));
        assert_eq!(link.quality, Quality::P720);
        assert_eq!(link.headers.get("Referer").map(String::as_str), Some("https://dood.wf/"));

        // the download URL was rewritten to the embed page
        assert_eq!(fetcher.request_count_for("https://dood.wf/d/k9x2hq"), 0);
        assert_eq!(
            fetcher.requests()[0],
            (Method::Get, "https://dood.wf/e/k9x2hq".to_string())
        );
    }

    #[tokio::test]
    async fn test_dood_without_pass_md5_is_decode_error() {
        let fetcher = MockFetcher::new().page("https://dood.wf/e/gone", "<p>Video not found</p>");
        let result = DoodExtractor.resolve("https://dood.wf/e/gone", &ctx(), &fetcher).await;
        assert!(matches!(result, Err(ResolveError::Decode(_))));
    }

    #[tokio::test]
    async fn test_dood_rejects_non_url_prefix() {
        let fetcher = MockFetcher::new()
            .page("https://dood.wf/e/k9x2hq", EMBED_PAGE)
            .page("https://dood.wf/pass_md5/48213-77-1/k9x2hq", "RELOAD");
        let result = DoodExtractor.resolve("https://dood.wf/e/k9x2hq", &ctx(), &fetcher).await;
        assert!(matches!(result, Err(ResolveError::Decode(_))));
    }
}
