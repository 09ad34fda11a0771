//! Configuration loading for the downloader.
//!
//! [`Config`] is the immutable settings record consumed read-only by every
//! component. It is assembled once at startup from four sources, highest
//! precedence first: CLI flags, environment variables, the YAML config file,
//! built-in defaults.
//!
//! The config file basename is `.wget2go` (a `.yaml` suffix is also
//! accepted), searched in `$HOME/.config/wget2go/`, `$HOME/`, then the
//! current directory.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::user_agent;
use crate::util::{self, ParseError};

/// Default chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// Default maximum concurrent chunk fetch tasks.
pub const DEFAULT_MAX_THREADS: usize = 5;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default redirect cap.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Default recursive depth cap (0 means unbounded).
pub const DEFAULT_RECURSIVE_LEVEL: u32 = 5;

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A size or duration string failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A config value is outside its allowed range.
    #[error("invalid config value for `{key}`: {message}")]
    InvalidValue {
        /// The offending config key.
        key: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path of the file that failed to load.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file could not be parsed as YAML.
    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        /// Path of the file that failed to parse.
        path: PathBuf,
        /// The underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Immutable settings record shared by all components.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target path override for a single download.
    pub output_file: Option<PathBuf>,
    /// Combined-output target path override.
    pub output_document: Option<PathBuf>,
    /// Enable resume of partial downloads.
    pub continue_download: bool,
    /// Chunk size in bytes; `0` disables chunked downloads.
    pub chunk_size: u64,
    /// Concurrency cap for chunk fetch tasks.
    pub max_threads: usize,
    /// Download rate limit in bytes/s; `0` means unlimited.
    pub limit_rate: u64,
    /// Per-request deadline.
    pub timeout: Duration,
    /// User-Agent header value.
    pub user_agent: String,
    /// Referer header value.
    pub referer: Option<String>,
    /// Custom request headers (name → value, last write wins).
    pub headers: HashMap<String, String>,
    /// Cookies joined into a single `Cookie` header.
    pub cookies: Vec<(String, String)>,
    /// Enable recursive crawling.
    pub recursive: bool,
    /// Maximum crawl depth; `0` means unbounded.
    pub recursive_level: u32,
    /// Rewrite links in saved files for offline browsing.
    pub convert_links: bool,
    /// Also fetch page requisites (images, scripts, stylesheets).
    pub page_requisites: bool,
    /// Redirect hop cap.
    pub max_redirects: usize,
    /// Whether redirects are followed at all.
    pub follow_redirects: bool,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Proxy list for `http://` targets (comma-separated).
    pub http_proxy: Option<String>,
    /// Proxy list for `https://` targets (comma-separated).
    pub https_proxy: Option<String>,
    /// Hosts/suffixes/CIDRs exempt from proxying (comma-separated).
    pub no_proxy: Option<String>,
    /// Force proxy usage even without explicit proxy URLs.
    pub proxy_enabled: bool,
    /// Proxy Basic auth username.
    pub proxy_username: Option<String>,
    /// Proxy Basic auth password.
    pub proxy_password: Option<String>,
    /// Accept Metalink responses (parsing is out of scope; flag is carried).
    pub metalink: bool,
    /// Honour robots.txt during recursive crawls.
    pub robots_txt: bool,
    /// Log errors only.
    pub quiet: bool,
    /// Log debug detail.
    pub verbose: bool,
    /// Render progress (carried; rendering is an external collaborator).
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_file: None,
            output_document: None,
            continue_download: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_threads: DEFAULT_MAX_THREADS,
            limit_rate: 0,
            timeout: DEFAULT_TIMEOUT,
            user_agent: user_agent::default_user_agent(),
            referer: None,
            headers: HashMap::new(),
            cookies: Vec::new(),
            recursive: false,
            recursive_level: DEFAULT_RECURSIVE_LEVEL,
            convert_links: false,
            page_requisites: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            follow_redirects: true,
            insecure: false,
            http_proxy: None,
            https_proxy: None,
            no_proxy: None,
            proxy_enabled: false,
            proxy_username: None,
            proxy_password: None,
            metalink: false,
            robots_txt: true,
            quiet: false,
            verbose: false,
            progress: true,
        }
    }
}

impl Config {
    /// Applies values from a loaded config file onto this config.
    ///
    /// File values only fill slots still at their defaults relative to the
    /// file's keys; callers apply env and CLI afterwards so the precedence
    /// order stays CLI > env > file > defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a size/duration string in the file fails
    /// to parse or a value is out of range.
    pub fn apply_file(&mut self, file: &FileConfig) -> Result<(), ConfigError> {
        file.validate()?;

        if let Some(output_file) = &file.output_file {
            self.output_file = Some(PathBuf::from(output_file));
        }
        if let Some(continue_download) = file.continue_download {
            self.continue_download = continue_download;
        }
        if let Some(chunk_size) = &file.chunk_size {
            self.chunk_size = util::parse_size(chunk_size)?;
        }
        if let Some(max_threads) = file.max_threads {
            self.max_threads = max_threads;
        }
        if let Some(limit_rate) = &file.limit_rate {
            self.limit_rate = util::parse_size(limit_rate)?;
        }
        if let Some(timeout) = &file.timeout {
            self.timeout = parse_duration(timeout)?;
        }
        if let Some(user_agent) = &file.user_agent {
            self.user_agent.clone_from(user_agent);
        }
        if let Some(referer) = &file.referer {
            self.referer = Some(referer.clone());
        }
        if let Some(recursive) = file.recursive {
            self.recursive = recursive;
        }
        if let Some(recursive_level) = file.recursive_level {
            self.recursive_level = recursive_level;
        }
        if let Some(convert_links) = file.convert_links {
            self.convert_links = convert_links;
        }
        if let Some(page_requisites) = file.page_requisites {
            self.page_requisites = page_requisites;
        }
        if let Some(max_redirects) = file.max_redirects {
            self.max_redirects = max_redirects;
        }
        if let Some(follow_redirects) = file.follow_redirects {
            self.follow_redirects = follow_redirects;
        }
        if let Some(insecure) = file.insecure {
            self.insecure = insecure;
        }
        if let Some(http_proxy) = &file.http_proxy {
            self.http_proxy = Some(http_proxy.clone());
        }
        if let Some(https_proxy) = &file.https_proxy {
            self.https_proxy = Some(https_proxy.clone());
        }
        if let Some(no_proxy) = &file.no_proxy {
            self.no_proxy = Some(no_proxy.clone());
        }
        if let Some(proxy_username) = &file.proxy_username {
            self.proxy_username = Some(proxy_username.clone());
        }
        if let Some(proxy_password) = &file.proxy_password {
            self.proxy_password = Some(proxy_password.clone());
        }
        if let Some(robots_txt) = file.robots_txt {
            self.robots_txt = robots_txt;
        }
        if let Some(quiet) = file.quiet {
            self.quiet = quiet;
        }
        if let Some(verbose) = file.verbose {
            self.verbose = verbose;
        }
        if let Some(progress) = file.progress {
            self.progress = progress;
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    ///
    /// Proxy variables are tried lowercase first, then uppercase, and only
    /// fill slots not already set by the config file. `WGET2GO_*` variables
    /// override file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a numeric/size/duration variable fails
    /// to parse.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if self.http_proxy.is_none() {
            self.http_proxy = env_first(&["http_proxy", "HTTP_PROXY"]);
        }
        if self.https_proxy.is_none() {
            self.https_proxy = env_first(&["https_proxy", "HTTPS_PROXY"]);
        }
        if self.no_proxy.is_none() {
            self.no_proxy = env_first(&["no_proxy", "NO_PROXY"]);
        }

        if let Some(output) = env_first(&["WGET2GO_OUTPUT"]) {
            self.output_file = Some(PathBuf::from(output));
        }
        if let Some(user_agent) = env_first(&["WGET2GO_USER_AGENT"]) {
            self.user_agent = user_agent;
        }
        if let Some(timeout) = env_first(&["WGET2GO_TIMEOUT"]) {
            self.timeout = parse_duration(&timeout)?;
        }
        if let Some(max_threads) = env_first(&["WGET2GO_MAX_THREADS"]) {
            self.max_threads =
                max_threads
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "WGET2GO_MAX_THREADS",
                        message: format!("expected integer, got `{max_threads}`"),
                    })?;
        }
        if let Some(limit_rate) = env_first(&["WGET2GO_LIMIT_RATE"]) {
            self.limit_rate = util::parse_size(&limit_rate)?;
        }

        Ok(())
    }
}

/// YAML-backed file configuration; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default output path.
    pub output_file: Option<String>,
    /// Enable resume by default.
    #[serde(rename = "continue")]
    pub continue_download: Option<bool>,
    /// Chunk size as a size string (`1M`).
    pub chunk_size: Option<String>,
    /// Concurrency cap (1–100).
    pub max_threads: Option<usize>,
    /// Rate limit as a size string (`500K`).
    pub limit_rate: Option<String>,
    /// Per-request timeout as a duration string (`30s`).
    pub timeout: Option<String>,
    /// User-Agent override.
    pub user_agent: Option<String>,
    /// Referer override.
    pub referer: Option<String>,
    /// Recursive crawl default.
    pub recursive: Option<bool>,
    /// Recursion depth cap default.
    pub recursive_level: Option<u32>,
    /// Link rewrite default.
    pub convert_links: Option<bool>,
    /// Page requisites default.
    pub page_requisites: Option<bool>,
    /// Redirect cap default.
    pub max_redirects: Option<usize>,
    /// Follow-redirects default.
    pub follow_redirects: Option<bool>,
    /// Skip TLS verification default.
    pub insecure: Option<bool>,
    /// HTTP proxy list.
    pub http_proxy: Option<String>,
    /// HTTPS proxy list.
    pub https_proxy: Option<String>,
    /// Proxy exemption list.
    pub no_proxy: Option<String>,
    /// Proxy username.
    pub proxy_username: Option<String>,
    /// Proxy password.
    pub proxy_password: Option<String>,
    /// Robots honouring default.
    pub robots_txt: Option<bool>,
    /// Quiet default.
    pub quiet: Option<bool>,
    /// Verbose default.
    pub verbose: Option<bool>,
    /// Progress default.
    pub progress: Option<bool>,
}

impl FileConfig {
    /// Validates file values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max_threads) = self.max_threads {
            if !(1..=100).contains(&max_threads) {
                return Err(ConfigError::InvalidValue {
                    key: "max_threads",
                    message: format!("{max_threads} outside expected range 1..=100"),
                });
            }
        }
        if let Some(max_redirects) = self.max_redirects {
            if max_redirects > 50 {
                return Err(ConfigError::InvalidValue {
                    key: "max_redirects",
                    message: format!("{max_redirects} outside expected range 0..=50"),
                });
            }
        }
        Ok(())
    }

    /// Loads a config file from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Yaml`] on failure.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Searches the standard locations and loads the first config file found.
    ///
    /// Search order: `$HOME/.config/wget2go/`, `$HOME/`, current directory;
    /// basename `.wget2go` with or without a `.yaml` suffix. Missing files
    /// are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] only when a file exists but fails to load.
    pub fn discover() -> Result<Option<Self>, ConfigError> {
        for dir in search_dirs() {
            for name in [".wget2go.yaml", ".wget2go"] {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    debug!(path = %candidate.display(), "loading config file");
                    return Self::load(&candidate).map(Some);
                }
            }
        }
        Ok(None)
    }
}

fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = env::var_os("HOME").filter(|v| !v.is_empty()) {
        let home = PathBuf::from(home);
        dirs.push(home.join(".config").join("wget2go"));
        dirs.push(home);
    }
    dirs.push(PathBuf::from("."));
    dirs
}

fn env_first(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Parses a duration string: `300ms`, `30s`, `5m`, `2h`, or plain seconds.
///
/// # Errors
///
/// Returns [`ParseError::InvalidDuration`] for anything else.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let trimmed = input.trim();
    let invalid = || ParseError::InvalidDuration {
        value: input.to_string(),
    };

    let (number, unit) = match trimmed.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, "s"),
    };
    let value: f64 = number.trim().parse().map_err(|_| invalid())?;
    if value < 0.0 {
        return Err(invalid());
    }

    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(invalid()),
    };
    Ok(Duration::from_secs_f64(seconds))
}

/// Splits repeated `-H "Name: value"` flags into a header map
/// (last write wins).
#[must_use]
pub fn parse_headers(raw: &[String]) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for entry in raw {
        if let Some((name, value)) = entry.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if !name.is_empty() {
                headers.insert(name.to_string(), value.to_string());
            }
        }
    }
    headers
}

/// Splits a `name1=value1; name2=value2` cookie string into pairs,
/// preserving order.
#[must_use]
pub fn parse_cookies(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.max_threads, 5);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_redirects, 10);
        assert!(config.follow_redirects);
        assert!(config.robots_txt);
        assert_eq!(config.recursive_level, 5);
        assert!(!config.recursive);
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("-3s").is_err());
    }

    #[test]
    fn test_parse_headers_last_write_wins() {
        let headers = parse_headers(&[
            "X-Token: one".to_string(),
            "Accept: text/html".to_string(),
            "X-Token: two".to_string(),
        ]);
        assert_eq!(headers.get("X-Token").map(String::as_str), Some("two"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies("session=abc; theme=dark;  broken ; k=v=w");
        assert_eq!(
            cookies,
            vec![
                ("session".to_string(), "abc".to_string()),
                ("theme".to_string(), "dark".to_string()),
                ("k".to_string(), "v=w".to_string()),
            ]
        );
    }

    #[test]
    fn test_file_config_yaml_round_trip() {
        let yaml = "chunk_size: 4M\nmax_threads: 8\ncontinue: true\ntimeout: 10s\n";
        let file: FileConfig = serde_yaml::from_str(yaml).unwrap();
        let mut config = Config::default();
        config.apply_file(&file).unwrap();
        assert_eq!(config.chunk_size, 4 * 1024 * 1024);
        assert_eq!(config.max_threads, 8);
        assert!(config.continue_download);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_file_config_rejects_out_of_range_threads() {
        let file = FileConfig {
            max_threads: Some(0),
            ..FileConfig::default()
        };
        assert!(matches!(
            file.validate(),
            Err(ConfigError::InvalidValue { key: "max_threads", .. })
        ));
    }

    #[test]
    fn test_file_config_rejects_unknown_keys() {
        let yaml = "not_an_option: true\n";
        assert!(serde_yaml::from_str::<FileConfig>(yaml).is_err());
    }
}
