//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use wget2go::config::{parse_cookies, parse_duration, parse_headers, Config, ConfigError};
use wget2go::util;

/// Multi-threaded HTTP(S) downloader with chunked resume and recursive
/// site mirroring.
#[derive(Parser, Debug)]
#[command(name = "wget2go")]
#[command(author, version, about)]
#[command(after_help = "Exit codes:\n  0 = all URLs succeeded\n  1 = partial success (some failed)\n  2 = complete failure or fatal error")]
pub struct Cli {
    /// URLs to download.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Write the download to FILE.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write all documents to FILE.
    #[arg(short = 'O', long = "output-document", value_name = "FILE")]
    pub output_document: Option<PathBuf>,

    /// Resume partially downloaded files.
    #[arg(short = 'c', long = "continue")]
    pub continue_download: bool,

    /// Log errors only.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Log debug detail.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Chunk size for parallel downloads (e.g. 1M); 0 disables chunking.
    #[arg(long, value_name = "SIZE")]
    pub chunk_size: Option<String>,

    /// Maximum concurrent chunk fetch tasks.
    #[arg(long, value_name = "N")]
    pub max_threads: Option<usize>,

    /// Download rate limit in bytes/s (e.g. 500K); 0 means unlimited.
    #[arg(long, value_name = "RATE")]
    pub limit_rate: Option<String>,

    /// Per-request timeout (e.g. 30s).
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// User-Agent header value.
    #[arg(long, value_name = "STR")]
    pub user_agent: Option<String>,

    /// Referer header value.
    #[arg(long, value_name = "URL")]
    pub referer: Option<String>,

    /// Extra request header ("Name: value"); repeatable.
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Cookies as "name1=value1; name2=value2".
    #[arg(long, value_name = "STR")]
    pub cookie: Option<String>,

    /// Maximum redirect hops.
    #[arg(long, value_name = "N")]
    pub max_redirects: Option<usize>,

    /// Follow HTTP redirects.
    #[arg(
        long,
        value_name = "BOOL",
        num_args(0..=1),
        require_equals = true,
        default_missing_value = "true"
    )]
    pub follow_redirects: Option<bool>,

    /// Skip TLS certificate verification.
    #[arg(long)]
    pub insecure: bool,

    /// Proxy for http:// targets (comma-separated list rotates).
    #[arg(long, value_name = "URL")]
    pub http_proxy: Option<String>,

    /// Proxy for https:// targets (comma-separated list rotates).
    #[arg(long, value_name = "URL")]
    pub https_proxy: Option<String>,

    /// Hosts, .suffixes and CIDRs exempt from proxying (comma-separated).
    #[arg(long, value_name = "LIST")]
    pub no_proxy: Option<String>,

    /// Force proxy usage.
    #[arg(long)]
    pub proxy: bool,

    /// Proxy Basic auth username.
    #[arg(long = "proxy-user", value_name = "USER")]
    pub proxy_user: Option<String>,

    /// Proxy Basic auth password.
    #[arg(long = "proxy-password", value_name = "PASS")]
    pub proxy_password: Option<String>,

    /// Download recursively.
    #[arg(short = 'r', long)]
    pub recursive: bool,

    /// Maximum recursion depth (0 = unbounded).
    #[arg(short = 'l', long = "level", value_name = "N")]
    pub level: Option<u32>,

    /// Rewrite links in saved documents for offline browsing.
    #[arg(short = 'k', long)]
    pub convert_links: bool,

    /// Also fetch images, scripts and stylesheets needed to render pages.
    #[arg(short = 'p', long)]
    pub page_requisites: bool,

    /// Render progress output.
    #[arg(
        long,
        value_name = "BOOL",
        num_args(0..=1),
        require_equals = true,
        default_missing_value = "true"
    )]
    pub progress: Option<bool>,

    /// Accept Metalink responses.
    #[arg(long)]
    pub metalink: bool,

    /// Honour robots.txt during recursive crawls.
    #[arg(
        long = "robots-txt",
        value_name = "BOOL",
        num_args(0..=1),
        require_equals = true,
        default_missing_value = "true"
    )]
    pub robots_txt: Option<bool>,
}

impl Cli {
    /// Applies CLI values onto the config (highest precedence source).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a size or duration argument fails to
    /// parse.
    pub fn apply_to(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(output) = &self.output {
            config.output_file = Some(output.clone());
        }
        if let Some(output_document) = &self.output_document {
            config.output_document = Some(output_document.clone());
        }
        if self.continue_download {
            config.continue_download = true;
        }
        if self.quiet {
            config.quiet = true;
        }
        if self.verbose {
            config.verbose = true;
        }
        if let Some(chunk_size) = &self.chunk_size {
            config.chunk_size = util::parse_size(chunk_size)?;
        }
        if let Some(max_threads) = self.max_threads {
            config.max_threads = max_threads;
        }
        if let Some(limit_rate) = &self.limit_rate {
            config.limit_rate = util::parse_size(limit_rate)?;
        }
        if let Some(timeout) = &self.timeout {
            config.timeout = parse_duration(timeout)?;
        }
        if let Some(user_agent) = &self.user_agent {
            config.user_agent.clone_from(user_agent);
        }
        if let Some(referer) = &self.referer {
            config.referer = Some(referer.clone());
        }
        if !self.headers.is_empty() {
            config.headers = parse_headers(&self.headers);
        }
        if let Some(cookie) = &self.cookie {
            config.cookies = parse_cookies(cookie);
        }
        if let Some(max_redirects) = self.max_redirects {
            config.max_redirects = max_redirects;
        }
        if let Some(follow_redirects) = self.follow_redirects {
            config.follow_redirects = follow_redirects;
        }
        if self.insecure {
            config.insecure = true;
        }
        if let Some(http_proxy) = &self.http_proxy {
            config.http_proxy = Some(http_proxy.clone());
        }
        if let Some(https_proxy) = &self.https_proxy {
            config.https_proxy = Some(https_proxy.clone());
        }
        if let Some(no_proxy) = &self.no_proxy {
            config.no_proxy = Some(no_proxy.clone());
        }
        if self.proxy {
            config.proxy_enabled = true;
        }
        if let Some(proxy_user) = &self.proxy_user {
            config.proxy_username = Some(proxy_user.clone());
        }
        if let Some(proxy_password) = &self.proxy_password {
            config.proxy_password = Some(proxy_password.clone());
        }
        if self.recursive {
            config.recursive = true;
        }
        if let Some(level) = self.level {
            config.recursive_level = level;
        }
        if self.convert_links {
            config.convert_links = true;
        }
        if self.page_requisites {
            config.page_requisites = true;
        }
        if let Some(progress) = self.progress {
            config.progress = progress;
        }
        if self.metalink {
            config.metalink = true;
        }
        if let Some(robots_txt) = self.robots_txt {
            config.robots_txt = robots_txt;
        }
        Ok(())
    }
}
