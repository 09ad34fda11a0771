//! Shared User-Agent string for HTTP requests.
//!
//! Single source for the default UA so the downloader and the crawler send
//! consistent request identification.

/// Browser-like default User-Agent, used when no `user_agent` is configured.
///
/// Many origins serve reduced or blocked content to obviously non-browser
/// agents; the mirroring use case needs the same bytes a browser would get.
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

/// Returns the default User-Agent string.
#[must_use]
pub fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
