//! HTML link extraction.
//!
//! Walks the parsed document tree and collects URLs from the known
//! URL-bearing attributes, `srcset` candidates, inline `style` attributes,
//! `<meta http-equiv="refresh">` targets, and honours
//! `<meta name="robots" content="nofollow|noindex">` by clearing the
//! `follow` flag. Relative references are resolved against the supplied
//! base URL.

use std::sync::OnceLock;

use regex::Regex;
use scraper::node::Element;
use scraper::{Html, Node};
use url::Url;

use super::ParsedResult;

/// Attribute to extract per tag. `form`'s `action` is recognised but
/// deliberately not extracted: form targets are not downloadable content.
fn url_attribute(tag: &str) -> Option<&'static str> {
    match tag {
        "a" | "link" | "area" | "base" => Some("href"),
        "img" | "script" | "iframe" | "frame" | "embed" | "input" => Some("src"),
        "object" => Some("data"),
        "body" => Some("background"),
        "blockquote" | "q" | "ins" | "del" => Some("cite"),
        _ => None,
    }
}

#[allow(clippy::expect_used)]
fn style_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#).expect("static regex"))
}

/// Extracts links from an HTML document.
///
/// A leading UTF-8 BOM is stripped before parsing. Empty values, fragment
/// links (`#`), and `javascript:`/`mailto:`/`tel:`/`data:` schemes are
/// skipped. URLs that cannot be resolved to an absolute form are dropped.
#[must_use]
pub fn parse_html(body: &[u8], base_url: &str) -> ParsedResult {
    let body = strip_bom(body);
    let text = String::from_utf8_lossy(body);
    let document = Html::parse_document(&text);
    let base = Url::parse(base_url).ok();

    let mut result = ParsedResult::default();

    for node in document.tree.nodes() {
        let Node::Element(element) = node.value() else {
            continue;
        };
        let tag = element.name().to_ascii_lowercase();

        if tag == "meta" {
            process_meta(element, &base, &mut result);
            continue;
        }

        if let Some(attr) = url_attribute(&tag) {
            if let Some(raw) = element.attr(attr) {
                extract_attribute(raw, attr, &tag, &base, &mut result);
            }
        }

        if tag == "img" {
            if let Some(srcset) = element.attr("srcset") {
                extract_srcset(srcset, &base, &mut result);
            }
        }

        if let Some(style) = element.attr("style") {
            extract_style_urls(style, &tag, &base, &mut result);
        }
    }

    result
}

fn process_meta(element: &Element, base: &Option<Url>, result: &mut ParsedResult) {
    let name = element
        .attr("name")
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let content = element.attr("content").unwrap_or_default();

    if name == "robots" {
        let content = content.to_ascii_lowercase();
        if content.contains("nofollow") || content.contains("noindex") {
            result.follow = false;
        }
        return;
    }

    let http_equiv = element
        .attr("http-equiv")
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if http_equiv == "refresh" {
        // content format: "5;url=/next.html"
        if let Some(idx) = content.to_ascii_lowercase().find("url=") {
            let target = content[idx + 4..].trim().trim_matches(['\'', '"']);
            extract_attribute(target, "http-equiv", "meta", base, result);
        }
    }
}

fn extract_attribute(
    raw: &str,
    attr: &str,
    tag: &str,
    base: &Option<Url>,
    result: &mut ParsedResult,
) {
    let raw = raw.trim();
    if should_skip(raw) {
        return;
    }
    if let Some(absolute) = resolve(raw, base) {
        result.push(raw, absolute, attr, tag);
    }
}

fn extract_srcset(srcset: &str, base: &Option<Url>, result: &mut ParsedResult) {
    for candidate in srcset.split(',') {
        // first token of each candidate is the URL, the rest a descriptor
        let Some(raw) = candidate.split_whitespace().next() else {
            continue;
        };
        if should_skip(raw) {
            continue;
        }
        if let Some(absolute) = resolve(raw, base) {
            result.push(raw, absolute, "srcset", "img");
        }
    }
}

fn extract_style_urls(style: &str, tag: &str, base: &Option<Url>, result: &mut ParsedResult) {
    for capture in style_url_regex().captures_iter(style) {
        let Some(raw) = capture.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if should_skip(raw) {
            continue;
        }
        if let Some(absolute) = resolve(raw, base) {
            result.push(raw, absolute, "style", tag);
        }
    }
}

fn should_skip(raw: &str) -> bool {
    raw.is_empty()
        || raw == "#"
        || raw.starts_with("javascript:")
        || raw.starts_with("mailto:")
        || raw.starts_with("tel:")
        || raw.starts_with("data:")
}

fn resolve(raw: &str, base: &Option<Url>) -> Option<String> {
    match Url::parse(raw) {
        Ok(url) => Some(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => base
            .as_ref()
            .and_then(|b| b.join(raw).ok())
            .map(|u| u.to_string()),
        Err(_) => None,
    }
}

fn strip_bom(body: &[u8]) -> &[u8] {
    body.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.com/dir/page.html";

    fn urls_of(result: &ParsedResult) -> Vec<&str> {
        result.urls.iter().map(|u| u.url.as_str()).collect()
    }

    #[test]
    fn test_extracts_anchor_and_resolves_relative() {
        let html = br#"<a href="sub/next.html">next</a>"#;
        let result = parse_html(html, BASE);
        assert_eq!(
            urls_of(&result),
            vec!["https://example.com/dir/sub/next.html"]
        );
        assert_eq!(result.urls[0].tag, "a");
        assert_eq!(result.urls[0].attr, "href");
    }

    #[test]
    fn test_extracts_known_tags() {
        let html = br#"
            <link href="/style.css" rel="stylesheet">
            <img src="/img.png">
            <script src="/app.js"></script>
            <iframe src="/frame.html"></iframe>
            <object data="/movie.swf"></object>
            <body background="/bg.jpg">
            <blockquote cite="/source.html">q</blockquote>
        "#;
        let result = parse_html(html, BASE);
        let urls = urls_of(&result);
        assert!(urls.contains(&"https://example.com/style.css"));
        assert!(urls.contains(&"https://example.com/img.png"));
        assert!(urls.contains(&"https://example.com/app.js"));
        assert!(urls.contains(&"https://example.com/frame.html"));
        assert!(urls.contains(&"https://example.com/movie.swf"));
        assert!(urls.contains(&"https://example.com/bg.jpg"));
        assert!(urls.contains(&"https://example.com/source.html"));
    }

    #[test]
    fn test_form_action_is_not_extracted() {
        let html = br#"<form action="/submit"><input type="submit"></form>"#;
        let result = parse_html(html, BASE);
        assert!(urls_of(&result).is_empty());
    }

    #[test]
    fn test_skips_fragment_and_schemes() {
        let html = br##"
            <a href="#">top</a>
            <a href="">empty</a>
            <a href="javascript:void(0)">js</a>
            <a href="mailto:a@b.c">mail</a>
            <a href="tel:+123">tel</a>
            <img src="data:image/png;base64,AAAA">
        "##;
        let result = parse_html(html, BASE);
        assert!(urls_of(&result).is_empty());
    }

    #[test]
    fn test_srcset_takes_first_token_per_candidate() {
        let html = br#"<img srcset="/small.jpg 1x, /large.jpg 2x">"#;
        let result = parse_html(html, BASE);
        assert_eq!(
            urls_of(&result),
            vec![
                "https://example.com/small.jpg",
                "https://example.com/large.jpg"
            ]
        );
        assert!(result.urls.iter().all(|u| u.attr == "srcset"));
    }

    #[test]
    fn test_style_attribute_urls() {
        let html = br#"<div style="background: url('/bg.png') no-repeat"></div>"#;
        let result = parse_html(html, BASE);
        assert_eq!(urls_of(&result), vec!["https://example.com/bg.png"]);
        assert_eq!(result.urls[0].attr, "style");
    }

    #[test]
    fn test_meta_robots_nofollow() {
        let html = br#"<meta name="robots" content="noindex, NOFOLLOW"><a href="/x">x</a>"#;
        let result = parse_html(html, BASE);
        assert!(!result.follow);
        // URLs are still collected; the crawler decides what to do
        assert_eq!(urls_of(&result), vec!["https://example.com/x"]);
    }

    #[test]
    fn test_meta_refresh_target_extracted() {
        let html = br#"<meta http-equiv="refresh" content="3;url=/next.html">"#;
        let result = parse_html(html, BASE);
        assert_eq!(urls_of(&result), vec!["https://example.com/next.html"]);
        assert_eq!(result.urls[0].tag, "meta");
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut body = vec![0xEF, 0xBB, 0xBF];
        body.extend_from_slice(br#"<a href="/x.html">x</a>"#);
        let result = parse_html(&body, BASE);
        assert_eq!(urls_of(&result), vec!["https://example.com/x.html"]);
    }

    #[test]
    fn test_absolute_urls_kept_verbatim() {
        let html = br#"<a href="https://other.example/page">x</a>"#;
        let result = parse_html(html, BASE);
        assert_eq!(urls_of(&result), vec!["https://other.example/page"]);
    }

    #[test]
    fn test_originals_map_raw_to_absolute() {
        let html = br#"<a href="sub/next.html">x</a>"#;
        let result = parse_html(html, BASE);
        assert_eq!(
            result.originals.get("sub/next.html").map(String::as_str),
            Some("https://example.com/dir/sub/next.html")
        );
    }
}
