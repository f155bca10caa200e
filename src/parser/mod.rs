//! Parser module for pulling source references out of HTML and inline scripts
//!
//! Everything here is synchronous and works on `&str`, so no parsed document
//! is ever held across an await point by the locator or resolver.

use base64::{
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD},
    Engine,
};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::sync::LazyLock;

use crate::models::SubtitleTrack;

/// Attributes consulted, in order, for an element's source URL
pub const SRC_ATTRIBUTES: &[&str] = &["src", "data-src", "data-litespeed-src"];

static IFRAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("iframe").unwrap());
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").unwrap());
static META: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta[http-equiv]").unwrap());
static TRACK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("track[src]").unwrap());

/// `file: "https://..."` as written by most embed players
static FILE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:"file"|'file'|\bfile)\s*:\s*["'](https?:[^"']+)["']"#).unwrap()
});
static LABEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:"label"|'label'|\blabel)\s*:\s*["']([^"']*)["']"#).unwrap()
});
static LOCATION_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\blocation(?:\.href)?\s*=\s*["']([^"']+)["']"#).unwrap()
});
static LOCATION_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\blocation\.(?:replace|assign)\(\s*["']([^"']+)["']"#).unwrap()
});
static PACKED_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\}\s*\(\s*'(.*?)'\s*,\s*(\d+)\s*,\s*(\d+)\s*,\s*'(.*?)'\s*\.split\(\s*'\|'\s*\)"#)
        .unwrap()
});
static PACKED_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").unwrap());
static BARE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\{,]\s*)([A-Za-z_$][\w$]*)\s*:").unwrap());
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*([\]\}])").unwrap());

const PACKED_ALPHABET: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Decode a base64-encoded value
///
/// Accepts the standard and URL-safe alphabets, with or without padding.
/// Returns None if decoding fails or the result is not UTF-8.
pub fn decode_base64_value(value: &str) -> Option<String> {
    let value: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if value.is_empty() {
        return None;
    }

    let decoded_bytes = [&STANDARD, &URL_SAFE, &STANDARD_NO_PAD, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(&value).ok())?;

    String::from_utf8(decoded_bytes).ok()
}

/// Source URL of an element, following the lazy-load attribute chain.
///
/// A literal `about:blank` only wins when no later attribute has a value.
pub fn element_src(element: &ElementRef) -> Option<String> {
    let mut blank = None;
    for attr in SRC_ATTRIBUTES {
        match element.value().attr(attr).map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("about:blank") => {
                blank.get_or_insert_with(|| v.to_string());
            }
            Some(v) if !v.is_empty() => return Some(v.to_string()),
            _ => {}
        }
    }
    blank
}

/// Extract a media or embed URL from an HTML fragment
///
/// Looks at `source`, `video`, `iframe` and `embed` elements in that order.
pub fn extract_embed_src(html: &str) -> Option<String> {
    let document = Html::parse_fragment(html);

    for tag in ["source", "video", "iframe", "embed"] {
        if let Ok(selector) = Selector::parse(tag) {
            if let Some(src) = document.select(&selector).find_map(|el| element_src(&el)) {
                return Some(src);
            }
        }
    }

    None
}

/// Source of every iframe in a document, in document order
pub fn iframe_sources(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let sources = document.select(&IFRAME).filter_map(|el| element_src(&el)).collect();
    sources
}

/// Target of a `<meta http-equiv="refresh" content="0; URL=...">` tag
pub fn meta_refresh_target(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let target = document
        .select(&META)
        .filter(|el| {
            el.value()
                .attr("http-equiv")
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("refresh"))
        })
        .filter_map(|el| el.value().attr("content"))
        .find_map(|content| {
            let idx = content.to_ascii_lowercase().find("url=")?;
            let target = content[idx + 4..].trim().trim_matches(|c| c == '\'' || c == '"');
            (!target.is_empty()).then(|| target.to_string())
        });
    target
}

/// Target of a `location.href = "..."` assignment in an inline script
pub fn location_redirect_target(html: &str) -> Option<String> {
    inline_scripts(html).iter().find_map(|script| {
        LOCATION_ASSIGN
            .captures(script)
            .or_else(|| LOCATION_CALL.captures(script))
            .map(|caps| caps[1].to_string())
    })
}

/// Text of every inline (`src`-less) script in a document
pub fn inline_scripts(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let scripts = document
        .select(&SCRIPT)
        .filter(|el| el.value().attr("src").is_none())
        .map(|el| el.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect();
    scripts
}

/// Caption tracks declared with `<track>` elements
pub fn extract_tracks(html: &str) -> Vec<SubtitleTrack> {
    let document = Html::parse_document(html);
    let tracks = document
        .select(&TRACK)
        .filter(|el| {
            el.value()
                .attr("kind")
                .map_or(true, |k| k.eq_ignore_ascii_case("captions") || k.eq_ignore_ascii_case("subtitles"))
        })
        .filter_map(|el| {
            let src = el.value().attr("src")?.trim();
            if src.is_empty() {
                return None;
            }
            let language = el
                .value()
                .attr("label")
                .or_else(|| el.value().attr("srclang"))
                .unwrap_or_default();
            Some(SubtitleTrack::new(language, src))
        })
        .collect();
    tracks
}

/// Substring of balanced brackets or braces following `anchor`.
///
/// Only whitespace, `:`, `=` or `(` may sit between the anchor and the
/// opening bracket. Quoted strings are skipped so brackets inside them do
/// not count.
pub fn extract_balanced<'a>(text: &'a str, anchor: &str) -> Option<&'a str> {
    if anchor.is_empty() {
        return None;
    }

    for (pos, _) in text.match_indices(anchor) {
        let rest = &text[pos + anchor.len()..];
        let Some(open) = rest.find(|c: char| !(c.is_whitespace() || matches!(c, ':' | '=' | '('))) else {
            continue;
        };
        let body = &rest[open..];
        if !body.starts_with(['[', '{']) {
            continue;
        }
        if let Some(end) = balanced_end(body) {
            return Some(&body[..end]);
        }
    }

    None
}

fn balanced_end(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse JSON, retrying once with JavaScript object syntax normalized
/// (bare keys quoted, single quotes swapped, trailing commas dropped).
pub fn parse_lenient_json(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(text).or_else(|err| {
        let quoted = BARE_KEY.replace_all(text, r#"$1"$2":"#);
        let swapped = quoted.replace('\'', "\"");
        let cleaned = TRAILING_COMMA.replace_all(&swapped, "$1");
        serde_json::from_str(&cleaned).map_err(|_| err)
    })
}

/// A `file:` reference found in script text, with its sibling label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub url: String,
    pub label: Option<String>,
}

/// Every `file: "https://..."` reference in raw page or script text
pub fn find_file_entries(text: &str) -> Vec<FileEntry> {
    let mut entries: Vec<FileEntry> = Vec::new();

    for caps in FILE_PATTERN.captures_iter(text) {
        let (Some(whole), Some(url)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let url = url.as_str().replace("\\/", "/");
        if entries.iter().any(|e| e.url == url) {
            continue;
        }

        // the label lives in the same object literal
        let start = text[..whole.start()].rfind(['{', '}']).filter(|&i| text[i..].starts_with('{'));
        let end = text[whole.end()..].find(['{', '}']).map(|i| whole.end() + i);
        let label = match (start, end) {
            (Some(s), Some(e)) => LABEL_PATTERN
                .captures(&text[s..e])
                .map(|c| c[1].trim().to_string())
                .filter(|l| !l.is_empty()),
            _ => None,
        };

        entries.push(FileEntry { url, label });
    }

    entries
}

/// Unpack every Dean Edwards `eval(function(p,a,c,k,e,d)...)` script in `text`
pub fn unpack_packed_scripts(text: &str) -> Vec<String> {
    text.match_indices("eval(function(p,a,c,k,e,")
        .filter_map(|(pos, _)| unpack(&text[pos..]))
        .collect()
}

/// Unpack the first packed script in `script`
pub fn unpack(script: &str) -> Option<String> {
    let caps = PACKED_ARGS.captures(script)?;
    let payload = caps[1].replace("\\'", "'").replace("\\\\", "\\");
    let radix: u32 = caps[2].parse().ok()?;
    if !(2..=62).contains(&radix) {
        return None;
    }
    let words: Vec<&str> = caps[4].split('|').collect();

    let unpacked = PACKED_WORD.replace_all(&payload, |word: &regex::Captures| {
        let token = &word[0];
        decode_packed_index(token, radix)
            .and_then(|idx| words.get(idx))
            .filter(|w| !w.is_empty())
            .map(|w| w.to_string())
            .unwrap_or_else(|| token.to_string())
    });

    Some(unpacked.into_owned())
}

fn decode_packed_index(token: &str, radix: u32) -> Option<usize> {
    token.chars().try_fold(0usize, |acc, c| {
        let digit = PACKED_ALPHABET.find(c)? as u32;
        if digit >= radix {
            return None;
        }
        acc.checked_mul(radix as usize)?.checked_add(digit as usize)
    })
}

/// Value of `key` in a query string or script assignment.
///
/// Matches `?key=value`, `"key":"value"` and `key = 'value'`.
pub fn find_keyed_value(text: &str, key: &str) -> Option<String> {
    let key = regex::escape(key);
    let patterns = [
        format!(r#"[?&]{key}=([^&"'\s<>]+)"#),
        format!(r#"["']?\b{key}["']?\s*[:=]\s*["']([^"']+)["']"#),
    ];

    patterns.iter().find_map(|pattern| {
        Regex::new(pattern)
            .ok()?
            .captures(text)
            .map(|caps| caps[1].to_string())
    })
}
