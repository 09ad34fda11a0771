//! Error types for the download module.
//!
//! Structured errors for every download operation, carrying the context
//! (url, path) needed for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during downloads.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed from the configuration.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// Network-level error (DNS, connection refused, TLS, proxy, ...).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx/5xx, or unexpected status).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server did not report a usable content length.
    #[error("no usable content length for {url}")]
    UnknownLength {
        /// The URL missing a length.
        url: String,
    },

    /// A ranged GET was answered with something other than 206.
    ///
    /// Recoverable inside the chunk downloader: the caller falls back to a
    /// single-stream download.
    #[error("server does not support range requests for {url} (status {status})")]
    RangeNotSupported {
        /// The URL probed.
        url: String,
        /// The status observed instead of 206.
        status: u16,
    },

    /// Observed byte count disagrees with the expected length.
    #[error("size mismatch for {subject}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// What was measured (path or url + range).
        subject: String,
        /// Expected byte count.
        expected: u64,
        /// Observed byte count.
        actual: u64,
    },

    /// The resume state file exists but cannot be decoded.
    #[error("resume state {path} is corrupt: {message}")]
    StateCorrupt {
        /// The state file path.
        path: PathBuf,
        /// Decode failure detail.
        message: String,
    },

    /// Filesystem error during download.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled; propagates without transformation.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a network error, promoting reqwest timeouts to [`Self::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a range-not-supported error from the observed status.
    pub fn range_not_supported(url: impl Into<String>, status: u16) -> Self {
        Self::RangeNotSupported {
            url: url.into(),
            status,
        }
    }

    /// Creates a size mismatch error.
    pub fn size_mismatch(subject: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::SizeMismatch {
            subject: subject.into(),
            expected,
            actual,
        }
    }

    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error should trigger single-stream fallback.
    #[must_use]
    pub fn is_range_not_supported(&self) -> bool {
        matches!(self, Self::RangeNotSupported { .. })
    }

    /// True when the error is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// No blanket `From<reqwest::Error>`/`From<std::io::Error>` impls: the
// variants require context (url, path) the source errors cannot provide, so
// the helper constructors are the conversion points.
