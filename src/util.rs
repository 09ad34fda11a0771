//! Shared utilities: size parsing/formatting, filename safety, hashing,
//! ETA calculation and human-readable timestamps.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from utility parsing functions.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The size string did not match `<number>[K|M|G|T|P][B]`.
    #[error("invalid size format: {value}")]
    InvalidSize {
        /// The rejected input.
        value: String,
    },

    /// The duration string did not match `<number>[ms|s|m|h]`.
    #[error("invalid duration format: {value}")]
    InvalidDuration {
        /// The rejected input.
        value: String,
    },
}

#[allow(clippy::expect_used)]
fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?)\s*([KMGTP]?B?)?$").expect("static size regex")
    })
}

/// Parses a human size string such as `1M`, `10K`, `2.5GB` into bytes.
///
/// Units multiply by powers of 1024. An empty string parses to `0`.
///
/// # Errors
///
/// Returns [`ParseError::InvalidSize`] when the input does not match the
/// expected format.
pub fn parse_size(input: &str) -> Result<u64, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }

    let upper = trimmed.to_uppercase();
    let captures = size_regex()
        .captures(&upper)
        .ok_or_else(|| ParseError::InvalidSize {
            value: input.to_string(),
        })?;

    let value: f64 = captures
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| ParseError::InvalidSize {
            value: input.to_string(),
        })?;

    let multiplier: f64 = match captures.get(2).map(|m| m.as_str()) {
        Some(unit) if unit.starts_with('K') => 1024.0,
        Some(unit) if unit.starts_with('M') => 1024.0 * 1024.0,
        Some(unit) if unit.starts_with('G') => 1024.0 * 1024.0 * 1024.0,
        Some(unit) if unit.starts_with('T') => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        Some(unit) if unit.starts_with('P') => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bytes = (value * multiplier) as u64;
    Ok(bytes)
}

/// Formats a byte count as a human-readable string (`512 B`, `1.5 MB`, ...).
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    const UNITS: [&str; 6] = ["KB", "MB", "GB", "TB", "PB", "EB"];
    #[allow(clippy::cast_precision_loss)]
    let value = bytes as f64 / div as f64;
    format!("{value:.1} {}", UNITS[exp])
}

/// Formats a transfer speed (`bytes/s`) as a human-readable string.
#[must_use]
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_size(bytes_per_second))
}

/// Replaces filesystem-unsafe characters (`<>:"/\|?*`) with `_` and caps the
/// result at 255 characters.
#[must_use]
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .take(255)
        .collect()
}

/// Estimates remaining transfer time.
///
/// Returns zero when `speed` is zero or the transfer is already complete.
#[must_use]
pub fn calculate_eta(total: u64, downloaded: u64, speed: u64) -> Duration {
    if speed == 0 || downloaded >= total {
        return Duration::ZERO;
    }
    let remaining = total - downloaded;
    #[allow(clippy::cast_precision_loss)]
    let seconds = remaining as f64 / speed as f64;
    Duration::from_secs_f64(seconds)
}

/// Renders a timestamp relative to now: "just now", "N minutes ago",
/// "N hours ago", "N days ago" (under 30 days), else `YYYY-MM-DD`.
#[must_use]
pub fn human_readable_time(t: DateTime<Utc>) -> String {
    let diff = Utc::now().signed_duration_since(t);

    if diff.num_minutes() < 1 {
        "just now".to_string()
    } else if diff.num_hours() < 1 {
        format!("{} minutes ago", diff.num_minutes())
    } else if diff.num_days() < 1 {
        format!("{} hours ago", diff.num_hours())
    } else if diff.num_days() < 30 {
        format!("{} days ago", diff.num_days())
    } else {
        t.format("%Y-%m-%d").to_string()
    }
}

/// Returns `path` unchanged if free, otherwise probes ` (1)`, ` (2)`, ...
/// suffixes (before the extension) until an unused path is found.
#[must_use]
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for n in 1u32.. {
        let candidate = parent.join(format!("{stem} ({n}){extension}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    path.to_path_buf()
}

/// Maps a URL into a local mirror path under `base_dir`.
///
/// The URL path lands relative to `base_dir`; query and fragment are
/// stripped, and `/`-terminated paths (and the bare root) get `index.html`
/// appended. Returns `None` for unparseable URLs.
#[must_use]
pub fn local_path_for_url(base_dir: &Path, url: &str) -> Option<PathBuf> {
    let parsed = url::Url::parse(url).ok()?;
    let mut path = parsed.path().to_string();
    if path.is_empty() || path == "/" {
        path = "/index.html".to_string();
    } else if path.ends_with('/') {
        path.push_str("index.html");
    }
    Some(base_dir.join(path.trim_start_matches('/')))
}

/// Computes the relative path from `from_dir` to `target`, using `/`
/// separators (web convention).
///
/// Both paths must share a root (the crawler always passes paths under the
/// same output directory).
#[must_use]
pub fn relative_path(from_dir: &Path, target: &Path) -> String {
    let from: Vec<_> = from_dir.components().collect();
    let to: Vec<_> = target.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from.len() {
        parts.push("..".to_string());
    }
    for component in &to[common..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Computes the SHA-256 digest of a file, hex-encoded.
///
/// # Errors
///
/// Returns the underlying IO error when the file cannot be read.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_parse_size_empty_is_zero() {
        assert_eq!(parse_size("").unwrap(), 0);
        assert_eq!(parse_size("   ").unwrap(), 0);
    }

    #[test]
    fn test_parse_size_plain_bytes() {
        assert_eq!(parse_size("1024").unwrap(), 1024);
        assert_eq!(parse_size("512B").unwrap(), 512);
    }

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_size("1T").unwrap(), 1024u64.pow(4));
        assert_eq!(parse_size("1P").unwrap(), 1024u64.pow(5));
    }

    #[test]
    fn test_parse_size_case_insensitive_and_b_suffix() {
        assert_eq!(parse_size("1m").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("2kb").unwrap(), 2048);
        assert_eq!(parse_size("2 KB").unwrap(), 2048);
    }

    #[test]
    fn test_parse_size_fractional() {
        assert_eq!(parse_size("1.5K").unwrap(), 1536);
    }

    #[test]
    fn test_parse_size_invalid() {
        assert!(parse_size("abc").is_err());
        assert!(parse_size("12X").is_err());
        assert!(parse_size("-5K").is_err());
    }

    #[test]
    fn test_format_size_buckets() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(2048), "2.0 KB/s");
    }

    #[test]
    fn test_safe_file_name_replaces_unsafe() {
        assert_eq!(safe_file_name("a<b>c:d\"e/f\\g|h?i*j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_safe_file_name_caps_length() {
        let long = "x".repeat(400);
        assert_eq!(safe_file_name(&long).chars().count(), 255);
    }

    #[test]
    fn test_calculate_eta_zero_speed() {
        assert_eq!(calculate_eta(100, 50, 0), Duration::ZERO);
    }

    #[test]
    fn test_calculate_eta_complete() {
        assert_eq!(calculate_eta(100, 100, 10), Duration::ZERO);
        assert_eq!(calculate_eta(100, 150, 10), Duration::ZERO);
    }

    #[test]
    fn test_calculate_eta_remaining() {
        assert_eq!(calculate_eta(100, 50, 10), Duration::from_secs(5));
    }

    #[test]
    fn test_human_readable_time_buckets() {
        let now = Utc::now();
        assert_eq!(human_readable_time(now), "just now");
        assert_eq!(
            human_readable_time(now - ChronoDuration::minutes(5)),
            "5 minutes ago"
        );
        assert_eq!(
            human_readable_time(now - ChronoDuration::hours(3)),
            "3 hours ago"
        );
        assert_eq!(
            human_readable_time(now - ChronoDuration::days(4)),
            "4 days ago"
        );
        let old = now - ChronoDuration::days(60);
        assert_eq!(human_readable_time(old), old.format("%Y-%m-%d").to_string());
    }

    #[test]
    fn test_unique_path_free_path_unchanged() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        assert_eq!(unique_path(&path), path);
    }

    #[test]
    fn test_unique_path_probes_suffixes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"x").unwrap();
        assert_eq!(unique_path(&path), dir.path().join("file (1).txt"));
        std::fs::write(dir.path().join("file (1).txt"), b"x").unwrap();
        assert_eq!(unique_path(&path), dir.path().join("file (2).txt"));
    }

    #[test]
    fn test_local_path_for_url_mapping() {
        let base = Path::new("/mirror");
        assert_eq!(
            local_path_for_url(base, "https://e.com/a/b.html").unwrap(),
            PathBuf::from("/mirror/a/b.html")
        );
        assert_eq!(
            local_path_for_url(base, "https://e.com/").unwrap(),
            PathBuf::from("/mirror/index.html")
        );
        assert_eq!(
            local_path_for_url(base, "https://e.com/dir/").unwrap(),
            PathBuf::from("/mirror/dir/index.html")
        );
        // query and fragment stripped
        assert_eq!(
            local_path_for_url(base, "https://e.com/p.html?x=1#frag").unwrap(),
            PathBuf::from("/mirror/p.html")
        );
        assert!(local_path_for_url(base, "not a url").is_none());
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/m/a"), Path::new("/m/a/b.html")),
            "b.html"
        );
        assert_eq!(
            relative_path(Path::new("/m/a"), Path::new("/m/c/d.html")),
            "../c/d.html"
        );
        assert_eq!(relative_path(Path::new("/m/a"), Path::new("/m/a")), ".");
    }

    #[test]
    fn test_sha256_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
