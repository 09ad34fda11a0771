//! CSS link extraction.
//!
//! Regex-based scan for `@import` rules (with or without `url(...)`, any
//! quoting) and `url(...)` functions. `data:` URIs are skipped. Source
//! encoding is detected from a leading `@charset "..."` rule and defaults
//! to UTF-8.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use super::ParsedResult;

#[allow(clippy::expect_used)]
fn import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"@import\s+(?:url\()?['"]?([^'")\s]+)['"]?\)?\s*;"#).expect("static regex")
    })
}

#[allow(clippy::expect_used)]
fn url_fn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#).expect("static regex"))
}

#[allow(clippy::expect_used)]
fn charset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*@charset\s+['"]([^'"]+)['"]\s*;"#).expect("static regex"))
}

/// Extracts links from a CSS document, resolving relative references
/// against `base_url`.
#[must_use]
pub fn parse_css(body: &[u8], base_url: &str) -> ParsedResult {
    let text = String::from_utf8_lossy(body);
    let base = Url::parse(base_url).ok();

    let mut result = ParsedResult {
        encoding: css_encoding(body),
        ..ParsedResult::default()
    };

    for capture in import_regex().captures_iter(&text) {
        if let Some(raw) = capture.get(1).map(|m| m.as_str()) {
            push_url(raw, "@import", &base, &mut result);
        }
    }

    for capture in url_fn_regex().captures_iter(&text) {
        if let Some(raw) = capture.get(1).map(|m| m.as_str()) {
            push_url(raw, "url()", &base, &mut result);
        }
    }

    result
}

/// Returns the encoding declared by a leading `@charset` rule, lowercased,
/// defaulting to `utf-8`.
#[must_use]
pub fn css_encoding(body: &[u8]) -> String {
    let head = String::from_utf8_lossy(&body[..body.len().min(128)]);
    charset_regex()
        .captures(&head)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_else(|| "utf-8".to_string())
}

fn push_url(raw: &str, attr: &str, base: &Option<Url>, result: &mut ParsedResult) {
    if raw.is_empty() || raw.starts_with("data:") {
        return;
    }
    let absolute = match Url::parse(raw) {
        Ok(url) => url.to_string(),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let Some(resolved) = base.as_ref().and_then(|b| b.join(raw).ok()) else {
                return;
            };
            resolved.to_string()
        }
        Err(_) => return,
    };
    result.push(raw, absolute, attr, "css");
}
