//! Post-download link rewriting for offline browsing.
//!
//! For every saved HTML/CSS file the crawler registers the extraction
//! result; `convert_all` then locates each raw URL in the file bytes
//! (linear scan with a running offset), computes the relative path from the
//! file's directory to the URL's local destination, and splices the
//! replacement into a new byte buffer written atomically. The original file
//! is preserved as `<file>.orig` when backups are enabled.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::parse::ParsedResult;
use crate::util;

/// Rewrite style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RewriteMode {
    /// Replace URLs with the full relative path into the mirror.
    #[default]
    Whole,
    /// Replace URLs with just the target's basename.
    FileOnly,
}

/// Errors from the link rewriter.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Filesystem failure while rewriting a file.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// One registered file awaiting rewriting.
#[derive(Debug, Clone)]
struct Conversion {
    filename: PathBuf,
    base_url: String,
    parsed: ParsedResult,
}

/// Rewrites absolute URLs in saved documents to relative local paths.
#[derive(Debug, Default)]
pub struct LinkRewriter {
    conversions: Vec<Conversion>,
    base_dir: PathBuf,
    backup: bool,
    mode: RewriteMode,
}

impl LinkRewriter {
    /// Creates a rewriter rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, backup: bool) -> Self {
        Self {
            conversions: Vec::new(),
            base_dir: base_dir.into(),
            backup,
            mode: RewriteMode::Whole,
        }
    }

    /// Sets the rewrite mode.
    #[must_use]
    pub fn with_mode(mut self, mode: RewriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Changes the mirror root.
    pub fn set_base_dir(&mut self, base_dir: impl Into<PathBuf>) {
        self.base_dir = base_dir.into();
    }

    /// Enables or disables `.orig` backups.
    pub fn set_backup(&mut self, backup: bool) {
        self.backup = backup;
    }

    /// Registers a saved file, its source URL and its extraction result for
    /// rewriting.
    pub fn add_conversion(
        &mut self,
        filename: impl Into<PathBuf>,
        base_url: impl Into<String>,
        parsed: ParsedResult,
    ) {
        let filename = filename.into();
        let base_url = base_url.into();
        debug!(
            path = %filename.display(),
            base = %base_url,
            urls = parsed.urls.len(),
            "registered for link rewriting"
        );
        self.conversions.push(Conversion {
            filename,
            base_url,
            parsed,
        });
    }

    /// Number of registered files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversions.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty()
    }

    /// Rewrites every registered file. Returns the number of files
    /// rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] when a file cannot be read or written.
    pub fn convert_all(&self) -> Result<usize, ConvertError> {
        let mut converted = 0usize;
        for conversion in &self.conversions {
            self.convert_file(conversion)?;
            converted += 1;
        }
        info!(files = converted, "link rewriting complete");
        Ok(converted)
    }

    fn convert_file(&self, conversion: &Conversion) -> Result<(), ConvertError> {
        let path = &conversion.filename;
        debug!(path = %path.display(), base = %conversion.base_url, "rewriting links");
        let data = std::fs::read(path).map_err(|e| ConvertError::io(path.clone(), e))?;

        if self.backup {
            let backup_path = backup_path_for(path);
            std::fs::write(&backup_path, &data)
                .map_err(|e| ConvertError::io(backup_path.clone(), e))?;
        }

        let rewritten = self.rewrite_bytes(&data, path, &conversion.parsed);

        // Atomic replace so a crash never leaves a half-rewritten document.
        let scratch = scratch_path_for(path);
        std::fs::write(&scratch, rewritten).map_err(|e| ConvertError::io(scratch.clone(), e))?;
        std::fs::rename(&scratch, path).map_err(|e| ConvertError::io(path.clone(), e))?;
        Ok(())
    }

    /// Splices replacements into a fresh buffer, scanning the original
    /// bytes left to right.
    fn rewrite_bytes(&self, data: &[u8], file: &Path, parsed: &ParsedResult) -> Vec<u8> {
        let mut output = Vec::with_capacity(data.len());
        let mut last_pos = 0usize;

        for parsed_url in &parsed.urls {
            let needle = parsed_url.url.as_bytes();
            let Some(found) = find_from(data, last_pos, needle) else {
                continue;
            };
            let Some(replacement) = self.replacement_for(file, &parsed_url.url) else {
                continue;
            };

            output.extend_from_slice(&data[last_pos..found]);
            output.extend_from_slice(replacement.as_bytes());
            last_pos = found + needle.len();
        }

        output.extend_from_slice(&data[last_pos..]);
        output
    }

    /// Relative path (or basename) pointing at the URL's local mirror file.
    fn replacement_for(&self, file: &Path, url: &str) -> Option<String> {
        let target = util::local_path_for_url(&self.base_dir, url)?;
        match self.mode {
            RewriteMode::Whole => {
                let from_dir = file.parent().unwrap_or_else(|| Path::new(""));
                Some(util::relative_path(from_dir, &target))
            }
            RewriteMode::FileOnly => target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
        }
    }

    /// Restores a file from its `.orig` backup and removes the backup.
    ///
    /// # Errors
    ///
    /// Returns [`ConvertError::Io`] when the backup is missing or cannot be
    /// applied.
    pub fn restore_backup(&self, filename: &Path) -> Result<(), ConvertError> {
        let backup_path = backup_path_for(filename);
        let data =
            std::fs::read(&backup_path).map_err(|e| ConvertError::io(backup_path.clone(), e))?;
        std::fs::write(filename, data).map_err(|e| ConvertError::io(filename, e))?;
        std::fs::remove_file(&backup_path).map_err(|e| ConvertError::io(backup_path.clone(), e))?;
        Ok(())
    }

    /// Removes every `.orig` backup for registered files. Missing backups
    /// are skipped.
    pub fn clean_backups(&self) {
        for conversion in &self.conversions {
            let backup_path = backup_path_for(&conversion.filename);
            if backup_path.exists() {
                if let Err(e) = std::fs::remove_file(&backup_path) {
                    warn!(path = %backup_path.display(), error = %e, "failed to remove backup");
                }
            }
        }
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".orig");
    PathBuf::from(name)
}

fn scratch_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".rewrite.tmp");
    PathBuf::from(name)
}

fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| from + pos)
}
