//! Link extraction from HTML and CSS documents.
//!
//! Both extractors yield absolute URLs with tag/attribute provenance so the
//! crawler can classify page requisites and the link rewriter can locate the
//! raw bytes later.

mod css;
mod html;

pub use css::{css_encoding, parse_css};
pub use html::parse_html;

use std::collections::HashMap;

/// A URL extracted from a document, with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// Absolute URL after base resolution.
    pub url: String,
    /// Attribute the URL came from (`href`, `src`, `srcset`, `style`,
    /// `@import`, `url()`).
    pub attr: String,
    /// Tag the URL came from (`a`, `img`, ..., `css` for stylesheet bodies).
    pub tag: String,
}

/// Result of extracting links from one document.
#[derive(Debug, Clone)]
pub struct ParsedResult {
    /// Extracted URLs in document order.
    pub urls: Vec<ParsedUrl>,
    /// False when a `<meta name="robots">` tag said `nofollow`/`noindex`.
    pub follow: bool,
    /// Detected source encoding (defaults to `utf-8`).
    pub encoding: String,
    /// Raw attribute value → absolute URL, for link rewriting.
    pub originals: HashMap<String, String>,
}

impl Default for ParsedResult {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            follow: true,
            encoding: "utf-8".to_string(),
            originals: HashMap::new(),
        }
    }
}

impl ParsedResult {
    fn push(&mut self, raw: &str, absolute: String, attr: &str, tag: &str) {
        self.originals.insert(raw.to_string(), absolute.clone());
        self.urls.push(ParsedUrl {
            url: absolute,
            attr: attr.to_string(),
            tag: tag.to_string(),
        });
    }
}
