//! Constants module for the stream resolver
//!
//! Contains the default host priority, shared endpoint paths and the
//! built-in site profiles.

/// Embed host preferences
pub mod hosts {
    /// Host substrings ranked best first, used when a profile declares none.
    /// Hosts with a dedicated extractor come before the generic scan ones.
    pub const DEFAULT_HOST_PRIORITY: &[&str] = &[
        "filemoon",
        "streamwish",
        "vidhide",
        "filelions",
        "dood",
        "mp4upload",
        "ok.ru",
        "pixeldrain",
    ];
}

/// Endpoint paths shared by WordPress player themes
pub mod endpoints {
    /// WordPress ajax endpoint used by dooplay and similar player themes
    pub const ADMIN_AJAX: &str = "/wp-admin/admin-ajax.php";
}

/// Built-in site profiles
pub mod sites {
    use super::endpoints::ADMIN_AJAX;
    use crate::locator::{AjaxField, LocatorStrategy, SiteProfile};

    /// Every built-in profile
    pub fn builtin() -> Vec<SiteProfile> {
        vec![
            dooplay("Oppadrama", &["oppadrama"]),
            dooplay("Dramaindo", &["dramaindo"]),
            dooplay("Nunadrama", &["nunadrama"]),
            samehadaku(),
            mirror_select("Nimeindo", &["nimeindo"]),
            mirror_select("NontonAnimeID", &["nontonanimeid"]),
            mirror_select("Filmapik", &["filmapik"]),
            muvipro("Pusatfilm", &["pusatfilm"]),
            muvipro("Kitanonton", &["kitanonton"]),
            muvipro("Klikxxi", &["klikxxi"]),
            muvipro("Midasmovie", &["midasmovie"]),
            muvipro("Melongmovie", &["melongmovie"]),
            nomat(),
        ]
    }

    fn profile(name: &str, domains: &[&str], strategies: Vec<LocatorStrategy>) -> SiteProfile {
        SiteProfile {
            name: name.to_string(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            strategies,
            host_priority: Vec::new(),
        }
    }

    fn iframe(selector: &str) -> LocatorStrategy {
        LocatorStrategy::DirectIframe {
            selector: selector.to_string(),
        }
    }

    fn theme_ajax(selector: &str, action: &str) -> LocatorStrategy {
        LocatorStrategy::AjaxPlayer {
            selector: selector.to_string(),
            endpoint: ADMIN_AJAX.to_string(),
            fields: vec![
                AjaxField::literal("action", action),
                AjaxField::attribute("post", "data-post"),
                AjaxField::attribute("nume", "data-nume"),
                AjaxField::attribute("type", "data-type"),
            ],
            nonce_key: None,
        }
    }

    /// Dooplay theme: server tabs posted as `doo_player_ajax`
    fn dooplay(name: &str, domains: &[&str]) -> SiteProfile {
        profile(
            name,
            domains,
            vec![
                theme_ajax("li.dooplay_player_option", "doo_player_ajax"),
                iframe("div.pframe iframe, #dooplay_player_response iframe"),
            ],
        )
    }

    fn samehadaku() -> SiteProfile {
        profile(
            "Samehadaku",
            &["samehadaku"],
            vec![
                theme_ajax("div.east_player_option", "player_ajax"),
                iframe("#player_embed iframe, div.player-embed iframe"),
            ],
        )
    }

    /// Themesia style: a `<select class="mirror">` of base64 iframe fragments
    fn mirror_select(name: &str, domains: &[&str]) -> SiteProfile {
        profile(
            name,
            domains,
            vec![
                LocatorStrategy::Base64Attribute {
                    selector: "select.mirror option[value]".to_string(),
                    attribute: "value".to_string(),
                },
                LocatorStrategy::Base64Attribute {
                    selector: "[data-em]".to_string(),
                    attribute: "data-em".to_string(),
                },
                iframe("#pembed iframe, div.player-embed iframe, div.video-content iframe"),
            ],
        )
    }

    /// Muvipro theme: one player per `?player=N` tab page
    fn muvipro(name: &str, domains: &[&str]) -> SiteProfile {
        profile(
            name,
            domains,
            vec![
                iframe("div.gmr-embed-responsive iframe"),
                LocatorStrategy::MirrorPage {
                    selector: "ul.muvipro-player-tabs li a".to_string(),
                },
            ],
        )
    }

    /// Server list published as JSON in an inline script
    fn nomat() -> SiteProfile {
        profile(
            "Nomat",
            &["nomat"],
            vec![
                LocatorStrategy::EmbeddedJson {
                    anchor: "sources".to_string(),
                    url_fields: vec!["file".to_string(), "url".to_string(), "link".to_string()],
                    label_field: "label".to_string(),
                    subtitle_field: "subtitle_url".to_string(),
                },
                iframe("div.player iframe, #player iframe"),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_profiles_are_unique() {
        let profiles = sites::builtin();
        assert_eq!(profiles.len(), 13);

        let names: HashSet<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names.len(), profiles.len());
        assert!(profiles.iter().all(|p| !p.domains.is_empty() && !p.strategies.is_empty()));
    }

    #[test]
    fn test_builtin_profile_matching() {
        let profiles = sites::builtin();
        let find = |url: &str| profiles.iter().find(|p| p.matches(url)).map(|p| p.name.clone());

        assert_eq!(find("https://v1.samehadaku.how/anime-episode-1/").as_deref(), Some("Samehadaku"));
        assert_eq!(find("https://tv.oppadrama.id/episode/x/").as_deref(), Some("Oppadrama"));
        assert_eq!(find("https://klikxxi.me/movie/").as_deref(), Some("Klikxxi"));
        assert!(find("https://unknown.example/").is_none());
    }

    #[test]
    fn test_builtin_profiles_serialize() {
        let json = serde_json::to_string(&sites::builtin()).unwrap();
        let parsed: Vec<crate::locator::SiteProfile> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sites::builtin());
    }

    #[test]
    fn test_default_host_priority() {
        assert_eq!(hosts::DEFAULT_HOST_PRIORITY[0], "filemoon");
        assert!(hosts::DEFAULT_HOST_PRIORITY.contains(&"dood"));
        assert_eq!(endpoints::ADMIN_AJAX, "/wp-admin/admin-ajax.php");
    }
}
