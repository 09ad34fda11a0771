//! Proxy selection policy.
//!
//! Chooses a proxy per request: `https://` targets prefer the HTTPS proxy
//! list and fall back to the HTTP list; `http://` targets use the HTTP
//! list. Multiple proxies in one variable (comma-separated) are rotated
//! round-robin with a per-direction counter. Hosts matching `no_proxy`
//! (exact, `.`-prefixed suffix, or IPv4/IPv6 CIDR) bypass proxying.
//!
//! Configured credentials are injected into the selected proxy URL so the
//! HTTP layer emits `Proxy-Authorization: Basic ...` and tunnels `https://`
//! targets with CONNECT.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::warn;
use url::Url;

use crate::config::Config;

/// Per-request proxy chooser built from the configuration.
#[derive(Debug)]
pub struct ProxySelector {
    http_proxies: Vec<Url>,
    https_proxies: Vec<Url>,
    no_proxy: Vec<String>,
    http_index: AtomicUsize,
    https_index: AtomicUsize,
}

impl ProxySelector {
    /// Builds a selector from the configuration.
    ///
    /// Returns `None` when no proxy is configured at all, so the HTTP client
    /// skips proxy routing entirely.
    #[must_use]
    pub fn from_config(config: &Config) -> Option<Self> {
        let credentials = match (&config.proxy_username, &config.proxy_password) {
            (None, None) => None,
            (user, pass) => Some((
                user.clone().unwrap_or_default(),
                pass.clone().unwrap_or_default(),
            )),
        };

        let http_proxies = parse_proxy_list(config.http_proxy.as_deref(), credentials.as_ref());
        let https_proxies = parse_proxy_list(config.https_proxy.as_deref(), credentials.as_ref());
        if http_proxies.is_empty() && https_proxies.is_empty() {
            return None;
        }

        let no_proxy = config
            .no_proxy
            .as_deref()
            .map(parse_no_proxy_list)
            .unwrap_or_default();

        Some(Self {
            http_proxies,
            https_proxies,
            no_proxy,
            http_index: AtomicUsize::new(0),
            https_index: AtomicUsize::new(0),
        })
    }

    /// Selects the proxy for a target URL, or `None` for a direct connection.
    #[must_use]
    pub fn proxy_for(&self, target: &Url) -> Option<Url> {
        let host = target.host_str()?;
        if self.is_no_proxy(host) {
            return None;
        }

        if target.scheme() == "https" {
            if let Some(proxy) = round_robin(&self.https_proxies, &self.https_index) {
                return Some(proxy);
            }
            // No dedicated HTTPS proxy: reuse the HTTP proxy list.
            return round_robin(&self.http_proxies, &self.http_index);
        }
        round_robin(&self.http_proxies, &self.http_index)
    }

    /// True when `host` matches a `no_proxy` entry.
    #[must_use]
    pub fn is_no_proxy(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.no_proxy.iter().any(|pattern| {
            if host == *pattern {
                return true;
            }
            if let Some(suffix) = pattern.strip_prefix('.') {
                if host == suffix || host.ends_with(pattern.as_str()) {
                    return true;
                }
            }
            matches_cidr(&host, pattern)
        })
    }
}

fn round_robin(proxies: &[Url], index: &AtomicUsize) -> Option<Url> {
    if proxies.is_empty() {
        return None;
    }
    let next = index.fetch_add(1, Ordering::Relaxed);
    Some(proxies[next % proxies.len()].clone())
}

fn parse_proxy_list(raw: Option<&str>, credentials: Option<&(String, String)>) -> Vec<Url> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let with_scheme = if entry.contains("://") {
                entry.to_string()
            } else {
                format!("http://{entry}")
            };
            match Url::parse(&with_scheme) {
                Ok(mut url) => {
                    if let Some((user, pass)) = credentials {
                        if url.set_username(user).is_err() || url.set_password(Some(pass)).is_err()
                        {
                            warn!(proxy = %entry, "cannot attach credentials to proxy URL");
                        }
                    }
                    Some(url)
                }
                Err(_) => {
                    warn!(proxy = %entry, "ignoring unparseable proxy entry");
                    None
                }
            }
        })
        .collect()
}

fn parse_no_proxy_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// True when `host` is an IP address contained in the `a.b.c.d/n` or
/// `addr/n` CIDR block described by `pattern`.
fn matches_cidr(host: &str, pattern: &str) -> bool {
    let Some((network, prefix)) = pattern.split_once('/') else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u32>() else {
        return false;
    };
    let (Ok(network), Ok(host)) = (network.parse::<IpAddr>(), host.parse::<IpAddr>()) else {
        return false;
    };

    match (network, host) {
        (IpAddr::V4(network), IpAddr::V4(host)) => {
            prefix <= 32 && masked_v4(network, prefix) == masked_v4(host, prefix)
        }
        (IpAddr::V6(network), IpAddr::V6(host)) => {
            prefix <= 128 && masked_v6(network, prefix) == masked_v6(host, prefix)
        }
        _ => false,
    }
}

fn masked_v4(addr: Ipv4Addr, prefix: u32) -> u32 {
    let bits = u32::from(addr);
    if prefix == 0 {
        0
    } else {
        bits & (u32::MAX << (32 - prefix))
    }
}

fn masked_v6(addr: Ipv6Addr, prefix: u32) -> u128 {
    let bits = u128::from(addr);
    if prefix == 0 {
        0
    } else {
        bits & (u128::MAX << (128 - prefix))
    }
}
