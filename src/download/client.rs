//! HTTP client wrapper for the download engine and the crawler.
//!
//! Centralizes request policy: User-Agent, Referer, custom headers, the
//! joined `Cookie` header, forced `Accept-Encoding: identity` (so
//! `Content-Length` and `Range` stay byte-exact), redirect capping, TLS
//! verification, timeouts and proxy routing.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use reqwest::header::{
    ACCEPT_ENCODING, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, ETAG, LAST_MODIFIED,
    RANGE, REFERER, USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, instrument};
use url::Url;

use super::{DownloadError, ProxySelector};
use crate::config::Config;

/// Connect timeout applied in addition to the configured request deadline.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Response metadata extracted from a HEAD (or GET) response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// HTTP status code.
    pub status: u16,
    /// `Content-Length` in bytes, `-1` when unknown.
    pub content_length: i64,
    /// `Content-Type` header value, if present.
    pub content_type: Option<String>,
    /// Parsed `Last-Modified` (RFC 1123), if present and valid.
    pub last_modified: Option<DateTime<FixedOffset>>,
    /// `ETag` header value, if present.
    pub etag: Option<String>,
    /// True when the server advertised `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
}

/// HTTP client for downloads and crawling.
///
/// Created once per run and shared; connection pooling lives in the inner
/// `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: Arc<Config>,
}

impl HttpClient {
    /// Builds the client from the configuration.
    ///
    /// Redirect policy: when `follow_redirects` is false no redirect is
    /// followed at all; otherwise up to `max_redirects` hops. TLS
    /// verification follows `insecure`. Proxy routing is delegated to
    /// [`ProxySelector`] when any proxy is configured.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] when the underlying builder
    /// rejects the configuration.
    pub fn new(config: Arc<Config>) -> Result<Self, DownloadError> {
        let redirect = if config.follow_redirects {
            Policy::limited(config.max_redirects)
        } else {
            Policy::none()
        };

        let mut builder = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.timeout)
            .redirect(redirect);

        if config.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        // Proxy routing is decided entirely by the config (env variables
        // are merged into it upstream), so the builder's implicit system
        // proxy lookup is disabled either way.
        if let Some(selector) = ProxySelector::from_config(&config) {
            let selector = Arc::new(selector);
            builder = builder.proxy(reqwest::Proxy::custom(move |url: &Url| {
                selector.proxy_for(url)
            }));
        } else {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;

        Ok(Self { client, config })
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Sends a HEAD request and returns the parsed response metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for unparseable URLs and
    /// [`DownloadError::Network`]/[`DownloadError::Timeout`] on transport
    /// failures. Non-2xx statuses are reported in the metadata, not as
    /// errors; callers decide what they accept.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn head(&self, url: &str) -> Result<ResponseMeta, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let request = self.apply_headers(self.client.head(url));
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        Ok(parse_meta(&response))
    }

    /// Sends a GET request, optionally with a `Range` header, and returns
    /// the streaming response.
    ///
    /// The response is returned regardless of status; the chunk downloader
    /// and the single-stream path interpret `200`/`206` differently.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for unparseable URLs and
    /// [`DownloadError::Network`]/[`DownloadError::Timeout`] on transport
    /// failures.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get(
        &self,
        url: &str,
        range_header: Option<&str>,
    ) -> Result<Response, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let mut request = self.apply_headers(self.client.get(url));
        if let Some(range) = range_header {
            request = request.header(RANGE, range);
        }
        request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))
    }

    /// Issues a ranged GET for `start..=end` and requires `206 Partial
    /// Content`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::RangeNotSupported`] (carrying the observed
    /// status) for any non-206 answer; the chunk downloader uses this to
    /// fall back to a single-stream download. Transport failures surface as
    /// [`DownloadError::Network`]/[`DownloadError::Timeout`].
    #[instrument(level = "debug", skip(self), fields(url = %url, start, end))]
    pub async fn download_range(
        &self,
        url: &str,
        start: u64,
        end: u64,
    ) -> Result<Response, DownloadError> {
        let range = format!("bytes={start}-{end}");
        let response = self.get(url, Some(&range)).await?;
        let status = response.status().as_u16();
        if status != 206 {
            debug!(status, "ranged GET not answered with 206");
            return Err(DownloadError::range_not_supported(url, status));
        }
        Ok(response)
    }

    /// Applies the shared header policy to a request.
    fn apply_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.header(USER_AGENT, self.config.user_agent.as_str());

        if let Some(referer) = &self.config.referer {
            request = request.header(REFERER, referer.as_str());
        }

        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if !self.config.cookies.is_empty() {
            let cookie = self
                .config
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(COOKIE, cookie);
        }

        // Identity keeps Content-Length and Range offsets byte-exact.
        request.header(ACCEPT_ENCODING, "identity")
    }
}

/// Extracts [`ResponseMeta`] from response headers.
fn parse_meta(response: &Response) -> ResponseMeta {
    let headers = response.headers();

    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(-1);

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok());

    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let accept_ranges = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));

    ResponseMeta {
        status: response.status().as_u16(),
        content_length,
        content_type,
        last_modified,
        etag,
        accept_ranges,
    }
}
