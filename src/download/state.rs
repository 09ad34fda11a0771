//! Resume-state codec for chunked downloads.
//!
//! Persists per-chunk progress as a JSON array next to the output file
//! (`<output>.wget2go.state`). The writer is atomic (temp file + rename) so
//! a crash mid-save never corrupts an existing state file. The loader is
//! tolerant of shape drift: a record that no longer matches its chunk's
//! byte range resets that chunk instead of failing the download.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Chunk, DownloadError, TransferStatus};

/// Suffix appended to the output path for the state sidecar.
const STATE_SUFFIX: &str = ".wget2go.state";

/// Suffix appended to the output path for the in-progress data file.
const TEMP_SUFFIX: &str = ".tmp";

/// Returns the state file path for an output path.
#[must_use]
pub fn state_file_path(output: &Path) -> PathBuf {
    sibling_with_suffix(output, STATE_SUFFIX)
}

/// Returns the temporary data file path for an output path.
#[must_use]
pub fn temp_file_path(output: &Path) -> PathBuf {
    sibling_with_suffix(output, TEMP_SUFFIX)
}

fn sibling_with_suffix(output: &Path, suffix: &str) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Persists the chunk records atomically beside the output file.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] when the sidecar cannot be written.
pub fn save(output: &Path, chunks: &[Chunk]) -> Result<(), DownloadError> {
    let state_path = state_file_path(output);
    let payload = serde_json::to_vec_pretty(chunks).map_err(|e| DownloadError::StateCorrupt {
        path: state_path.clone(),
        message: e.to_string(),
    })?;

    let scratch = sibling_with_suffix(&state_path, ".tmp");
    std::fs::write(&scratch, payload).map_err(|e| DownloadError::io(scratch.clone(), e))?;
    std::fs::rename(&scratch, &state_path).map_err(|e| DownloadError::io(state_path.clone(), e))?;
    Ok(())
}

/// Loads persisted chunk progress onto `chunks`.
///
/// Records are matched by `index`, `start` and `end`; a record that matches
/// copies `completed` and `status` onto the chunk, anything else leaves the
/// chunk fresh. Returns whether a state file existed.
///
/// # Errors
///
/// Returns [`DownloadError::StateCorrupt`] when the file exists but cannot
/// be decoded.
pub fn load(output: &Path, chunks: &mut [Chunk]) -> Result<bool, DownloadError> {
    let state_path = state_file_path(output);
    if !state_path.exists() {
        return Ok(false);
    }

    let raw = std::fs::read(&state_path).map_err(|e| DownloadError::io(state_path.clone(), e))?;
    let records: Vec<Chunk> =
        serde_json::from_slice(&raw).map_err(|e| DownloadError::StateCorrupt {
            path: state_path.clone(),
            message: e.to_string(),
        })?;

    for chunk in chunks.iter_mut() {
        match records.iter().find(|r| r.index == chunk.index) {
            Some(record) if record.start == chunk.start && record.end == chunk.end => {
                chunk.completed = record.completed.min(chunk.size);
                chunk.status = record.status;
                // A chunk interrupted mid-fetch resumes from its byte count.
                if chunk.status == TransferStatus::Downloading {
                    chunk.status = TransferStatus::Pending;
                }
            }
            Some(record) => {
                debug!(
                    index = chunk.index,
                    stored_start = record.start,
                    stored_end = record.end,
                    "stored chunk shape disagrees with current partition, resetting"
                );
                chunk.reset();
            }
            None => chunk.reset(),
        }
    }

    Ok(true)
}

/// Removes the state file if present; missing files are not an error.
pub fn delete(output: &Path) {
    let state_path = state_file_path(output);
    if state_path.exists() {
        let _ = std::fs::remove_file(&state_path);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fresh_chunks() -> Vec<Chunk> {
        vec![Chunk::new(0, 0, 99), Chunk::new(1, 100, 199), Chunk::new(2, 200, 249)]
    }

    #[test]
    fn test_paths_append_suffixes() {
        let output = Path::new("/tmp/file.bin");
        assert_eq!(
            state_file_path(output),
            PathBuf::from("/tmp/file.bin.wget2go.state")
        );
        assert_eq!(temp_file_path(output), PathBuf::from("/tmp/file.bin.tmp"));
    }

    #[test]
    fn test_load_missing_returns_false() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");
        let mut chunks = fresh_chunks();
        assert!(!load(&output, &mut chunks).unwrap());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");

        let mut chunks = fresh_chunks();
        chunks[0].completed = 100;
        chunks[0].status = TransferStatus::Completed;
        chunks[1].completed = 42;
        chunks[1].status = TransferStatus::Downloading;
        save(&output, &chunks).unwrap();

        let mut reloaded = fresh_chunks();
        assert!(load(&output, &mut reloaded).unwrap());
        assert_eq!(reloaded[0].completed, 100);
        assert_eq!(reloaded[0].status, TransferStatus::Completed);
        assert_eq!(reloaded[1].completed, 42);
        // interrupted chunk returns to pending so a task re-fetches it
        assert_eq!(reloaded[1].status, TransferStatus::Pending);
        assert_eq!(reloaded[2].completed, 0);
    }

    #[test]
    fn test_load_resets_on_shape_mismatch() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");

        let mut chunks = fresh_chunks();
        chunks[1].completed = 50;
        chunks[1].status = TransferStatus::Completed;
        save(&output, &chunks).unwrap();

        // Remote size changed: new partition has different ranges.
        let mut different = vec![Chunk::new(0, 0, 99), Chunk::new(1, 100, 299)];
        assert!(load(&output, &mut different).unwrap());
        assert_eq!(different[0].completed, 0);
        assert_eq!(different[1].completed, 0);
        assert_eq!(different[1].status, TransferStatus::Pending);
    }

    #[test]
    fn test_load_corrupt_state_is_error() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");
        std::fs::write(state_file_path(&output), b"not json").unwrap();

        let mut chunks = fresh_chunks();
        assert!(matches!(
            load(&output, &mut chunks),
            Err(DownloadError::StateCorrupt { .. })
        ));
    }

    #[test]
    fn test_delete_removes_state() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.bin");
        save(&output, &fresh_chunks()).unwrap();
        assert!(state_file_path(&output).exists());
        delete(&output);
        assert!(!state_file_path(&output).exists());
        // idempotent
        delete(&output);
    }
}
