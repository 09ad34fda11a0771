//! robots.txt parsing and policy evaluation.
//!
//! Recognised directives: `user-agent`, `disallow`, `allow`, `crawl-delay`,
//! `sitemap`. Directives group under the most recently named user-agent;
//! `user-agent: *` forms the default rule. Path patterns are prefix matches
//! with `*` as a wildcard and a trailing `$` anchoring end-of-path;
//! everything else is escaped before the regex translation so literal
//! metacharacters in paths cannot mismatch.

use regex::Regex;
use url::Url;

/// One user-agent group from a robots.txt file.
#[derive(Debug, Clone, Default)]
pub struct RobotsRule {
    /// The user-agent the group applies to (lowercased; `*` is the default).
    pub user_agent: String,
    /// Denied path prefixes.
    pub disallow: Vec<String>,
    /// Granted path prefixes, evaluated before `disallow`.
    pub allow: Vec<String>,
    /// Requested delay between fetches, in seconds.
    pub crawl_delay: Option<u64>,
}

/// Parsed robots.txt policy for one host.
#[derive(Debug, Clone, Default)]
pub struct RobotsRuleSet {
    /// All user-agent groups in file order.
    pub rules: Vec<RobotsRule>,
    /// `Sitemap:` URLs (global, not per-agent).
    pub sitemaps: Vec<String>,
}

impl RobotsRuleSet {
    /// Parses a robots.txt byte buffer.
    ///
    /// Unknown directives and malformed lines are ignored; an empty
    /// `disallow` value clears the group's restrictions.
    #[must_use]
    pub fn parse(data: &[u8]) -> Self {
        let text = String::from_utf8_lossy(data);
        let mut set = Self::default();
        let mut current: Option<usize> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    set.rules.push(RobotsRule {
                        user_agent: value.to_ascii_lowercase(),
                        ..RobotsRule::default()
                    });
                    current = Some(set.rules.len() - 1);
                }
                "disallow" => {
                    if let Some(index) = current {
                        if value.is_empty() {
                            // empty disallow means "no restrictions"
                            set.rules[index].disallow.clear();
                        } else {
                            set.rules[index].disallow.push(value.to_string());
                        }
                    }
                }
                "allow" => {
                    if let Some(index) = current {
                        if !value.is_empty() {
                            set.rules[index].allow.push(value.to_string());
                        }
                    }
                }
                "crawl-delay" => {
                    if let Some(index) = current {
                        set.rules[index].crawl_delay = value.parse().ok();
                    }
                }
                "sitemap" => {
                    if !value.is_empty() {
                        set.sitemaps.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        set
    }

    /// True when the file declared any user-agent groups.
    #[must_use]
    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Answers whether `url` (a full URL or a bare path) may be fetched by
    /// `user_agent`.
    ///
    /// Rule selection: the first group whose user-agent string is a
    /// substring of the request UA (case-insensitive), else the `*` group,
    /// else allow. Within the group, `allow` patterns are evaluated first
    /// (first match grants), then `disallow` (first match denies),
    /// otherwise allow.
    #[must_use]
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        let Some(rule) = self.rule_for(user_agent) else {
            return true;
        };

        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            // bare paths (or unparseable input) are matched as-is
            Err(_) => url.to_string(),
        };

        for allow in &rule.allow {
            if match_path(&path, allow) {
                return true;
            }
        }
        for disallow in &rule.disallow {
            if match_path(&path, disallow) {
                return false;
            }
        }
        true
    }

    /// Requested crawl delay for `user_agent`, if any.
    #[must_use]
    pub fn crawl_delay(&self, user_agent: &str) -> Option<u64> {
        self.rule_for(user_agent).and_then(|rule| rule.crawl_delay)
    }

    fn rule_for(&self, user_agent: &str) -> Option<&RobotsRule> {
        let user_agent = user_agent.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.user_agent != "*" && user_agent.contains(&rule.user_agent))
            .or_else(|| self.rules.iter().find(|rule| rule.user_agent == "*"))
    }
}

/// Matches a path against a robots pattern: prefix semantics, `*` wildcard,
/// trailing `$` end anchor. Literal characters are regex-escaped first.
fn match_path(path: &str, pattern: &str) -> bool {
    let anchored = pattern.ends_with('$');
    let core = if anchored {
        &pattern[..pattern.len() - 1]
    } else {
        pattern
    };

    let mut regex = String::from("^");
    for (i, literal) in core.split('*').enumerate() {
        if i > 0 {
            regex.push_str(".*");
        }
        regex.push_str(&regex::escape(literal));
    }
    if anchored {
        regex.push('$');
    } else {
        regex.push_str(".*");
    }

    Regex::new(&regex).is_ok_and(|re| re.is_match(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "Mozilla/5.0 (compatible; wget2go/0.3)";

    #[test]
    fn test_empty_file_allows_all() {
        let set = RobotsRuleSet::parse(b"");
        assert!(set.is_allowed("https://example.com/anything", UA));
        assert!(!set.has_rules());
    }

    #[test]
    fn test_disallow_prefix_blocks_subpaths() {
        let set = RobotsRuleSet::parse(b"User-agent: *\nDisallow: /private/\n");
        assert!(!set.is_allowed("https://example.com/private/a.html", UA));
        assert!(!set.is_allowed("/private/deep/b.html", UA));
        assert!(set.is_allowed("https://example.com/public/b.html", UA));
    }

    #[test]
    fn test_empty_disallow_means_no_restrictions() {
        let set = RobotsRuleSet::parse(b"User-agent: *\nDisallow: /x/\nDisallow:\n");
        assert!(set.is_allowed("https://example.com/x/page", UA));
    }

    #[test]
    fn test_allow_evaluated_before_disallow() {
        let set =
            RobotsRuleSet::parse(b"User-agent: *\nAllow: /private/open/\nDisallow: /private/\n");
        assert!(set.is_allowed("https://example.com/private/open/x.html", UA));
        assert!(!set.is_allowed("https://example.com/private/x.html", UA));
    }

    #[test]
    fn test_wildcard_and_end_anchor() {
        let set = RobotsRuleSet::parse(b"User-agent: *\nDisallow: /*.pdf$\n");
        assert!(!set.is_allowed("https://example.com/docs/report.pdf", UA));
        assert!(set.is_allowed("https://example.com/docs/report.pdf.html", UA));
    }

    #[test]
    fn test_literal_metacharacters_escaped() {
        let set = RobotsRuleSet::parse(b"User-agent: *\nDisallow: /a+b(c)/\n");
        assert!(!set.is_allowed("/a+b(c)/page", UA));
        // without escaping, `+` would make /ab(c)/ match too
        assert!(set.is_allowed("/ab(c)/page", UA));
    }

    #[test]
    fn test_specific_agent_matched_by_substring() {
        let set = RobotsRuleSet::parse(
            b"User-agent: badbot\nDisallow: /\n\nUser-agent: *\nDisallow: /admin/\n",
        );
        assert!(!set.is_allowed("/index.html", "BadBot/1.0"));
        assert!(set.is_allowed("/index.html", UA));
        assert!(!set.is_allowed("/admin/", UA));
    }

    #[test]
    fn test_no_matching_rule_allows() {
        let set = RobotsRuleSet::parse(b"User-agent: badbot\nDisallow: /\n");
        assert!(set.is_allowed("/anything", UA));
    }

    #[test]
    fn test_crawl_delay_parsed() {
        let set = RobotsRuleSet::parse(b"User-agent: *\nCrawl-delay: 7\nDisallow: /x\n");
        assert_eq!(set.crawl_delay(UA), Some(7));
    }

    #[test]
    fn test_sitemaps_collected_globally() {
        let set = RobotsRuleSet::parse(
            b"Sitemap: https://example.com/sitemap.xml\nUser-agent: *\nDisallow:\nSitemap: https://example.com/news.xml\n",
        );
        assert_eq!(
            set.sitemaps,
            vec![
                "https://example.com/sitemap.xml",
                "https://example.com/news.xml"
            ]
        );
    }

    #[test]
    fn test_comments_and_garbage_ignored() {
        let set = RobotsRuleSet::parse(
            b"# a comment\nUser-agent: *\nnonsense line\nDisallow: /secret/\n",
        );
        assert!(!set.is_allowed("/secret/x", UA));
    }
}
