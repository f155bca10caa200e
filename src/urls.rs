//! URL helpers shared by the locator and the resolver

use url::Url;

/// Media file extensions that can be played without further extraction
const MEDIA_EXTENSIONS: &[&str] = &[".mp4", ".mkv", ".webm", ".m4v", ".m3u8"];

/// Make `raw` absolute against `base`.
///
/// URLs that already carry an http(s) scheme are returned unchanged, so
/// normalizing twice is a no-op. Returns None for empty input, non-web
/// schemes, or an unparsable base.
pub fn normalize_url(raw: &str, base: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(raw.to_string());
    }
    if lower.starts_with("about:") || lower.starts_with("javascript:") || lower.starts_with("data:") {
        return None;
    }

    let base = Url::parse(base).ok()?;
    let joined = base.join(raw).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

/// True for iframe targets that never lead to a video
pub fn is_noise(raw: &str) -> bool {
    let lower = raw.trim().to_ascii_lowercase();
    lower.is_empty()
        || lower.starts_with("about:blank")
        || lower.starts_with("javascript:")
        || lower.contains("youtube")
}

/// True when the URL points straight at a media file or playlist
pub fn is_media_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if lower.contains(".m3u8") {
        return true;
    }
    let path = lower.split(['?', '#']).next().unwrap_or("");
    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Lowercased host of a URL
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.to_ascii_lowercase())
}

/// `scheme://host[:port]` of a URL
pub fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    })
}

/// True when the URL's host contains any of `needles`
pub fn host_matches(url: &str, needles: &[impl AsRef<str>]) -> bool {
    host_of(url).is_some_and(|host| {
        needles
            .iter()
            .any(|n| !n.as_ref().is_empty() && host.contains(&n.as_ref().to_ascii_lowercase()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_relative_paths() {
        let base = "https://site.example/anime/ep-1/";
        assert_eq!(
            normalize_url("/embed/x", base).as_deref(),
            Some("https://site.example/embed/x")
        );
        assert_eq!(
            normalize_url("//cdn.example/v.mp4", base).as_deref(),
            Some("https://cdn.example/v.mp4")
        );
        assert_eq!(
            normalize_url("player.php?id=1", base).as_deref(),
            Some("https://site.example/anime/ep-1/player.php?id=1")
        );
    }

    #[test]
    fn test_normalize_absolute_unchanged() {
        let url = "https://Host.example/path?q=1";
        assert_eq!(normalize_url(url, "https://other/").as_deref(), Some(url));
    }

    #[test]
    fn test_normalize_rejects_non_web() {
        assert!(normalize_url("about:blank", "https://a/").is_none());
        assert!(normalize_url("javascript:void(0)", "https://a/").is_none());
        assert!(normalize_url("  ", "https://a/").is_none());
        assert!(normalize_url("/x", "not a url").is_none());
    }

    #[test]
    fn test_is_noise() {
        assert!(is_noise("about:blank"));
        assert!(is_noise("https://www.youtube.com/embed/abc"));
        assert!(is_noise(""));
        assert!(!is_noise("https://host/embed/x"));
    }

    #[test]
    fn test_is_media_url() {
        assert!(is_media_url("https://cdn/y.m3u8"));
        assert!(is_media_url("https://cdn/master.m3u8?t=1"));
        assert!(is_media_url("https://cdn/video.MP4?x=1"));
        assert!(!is_media_url("https://host/e/abc"));
        assert!(!is_media_url("https://host/mp4/page"));
    }

    #[test]
    fn test_origin_and_host() {
        assert_eq!(origin_of("https://Host.example:8443/e/1").as_deref(), Some("https://host.example:8443"));
        assert_eq!(origin_of("https://host.example/e/1").as_deref(), Some("https://host.example"));
        assert_eq!(host_of("https://Filemoon.SX/e/1").as_deref(), Some("filemoon.sx"));
        assert!(host_matches("https://dood.wf/e/1", &["dood"]));
        assert!(!host_matches("https://example.com/dood", &["dood"]));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Relative paths get the base scheme and host exactly once, and a
        /// second normalization changes nothing
        #[test]
        fn property_normalize_idempotent(path in "[a-z0-9]{1,10}(/[a-z0-9]{1,10}){0,3}") {
            let base = "https://site.example/watch/";
            let once = normalize_url(&format!("/{path}"), base).unwrap();
            prop_assert_eq!(&once, &format!("https://site.example/{path}"));
            prop_assert_eq!(once.matches("https://").count(), 1);
            let twice = normalize_url(&once, base).unwrap();
            prop_assert_eq!(twice, once);
        }
    }
}
