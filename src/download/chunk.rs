//! Chunked download engine.
//!
//! Splits a remote resource into byte ranges and fetches them with bounded
//! concurrency, writing each range at its absolute offset in a shared temp
//! file via positional writes. Progress is persisted after every settled
//! chunk so an interrupted run resumes from the sidecar state file. Servers
//! without real range support trigger a single-stream fallback.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::single::download_single;
use super::state;
use super::{Chunk, DownloadError, HttpClient, ResponseMeta, Throttle, TransferStatus};
use crate::config::Config;
use crate::util;

/// Adaptive downloader: chunked with resume when the server cooperates,
/// single-stream otherwise.
#[derive(Debug, Clone)]
pub struct ChunkDownloader {
    client: Arc<HttpClient>,
    config: Arc<Config>,
}

impl ChunkDownloader {
    /// Creates a downloader sharing the given client and configuration.
    #[must_use]
    pub fn new(client: Arc<HttpClient>, config: Arc<Config>) -> Self {
        Self { client, config }
    }

    /// Downloads `url` to `output_path` (or a derived path) and returns the
    /// final path.
    ///
    /// Strategy: HEAD for metadata, then chunked if the size and server
    /// capabilities allow it, verified by a `0-0` range probe; otherwise a
    /// single-stream download. A chunked attempt that turns out to hit a
    /// server without real range support falls back to single-stream.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on invalid input, transport failures,
    /// non-2xx metadata responses, size mismatches, unreadable resume
    /// state, filesystem errors, or cancellation.
    #[instrument(skip(self, cancel), fields(url = %url))]
    pub async fn download(
        &self,
        url: &str,
        output_path: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let meta = self.client.head(url).await?;
        if !(200..300).contains(&meta.status) {
            return Err(DownloadError::http_status(url, meta.status));
        }
        if meta.content_length <= 0 {
            return Err(DownloadError::UnknownLength {
                url: url.to_string(),
            });
        }
        #[allow(clippy::cast_sign_loss)]
        let content_length = meta.content_length as u64;

        let output = resolve_output_path(url, output_path, &self.config);
        debug!(
            path = %output.display(),
            content_length,
            accept_ranges = meta.accept_ranges,
            "resolved download target"
        );

        if !should_use_chunks(&self.config, &meta) {
            debug!("using single-stream download");
            download_single(&self.client, &self.config, url, &output, cancel).await?;
            return Ok(output);
        }

        // Probe with a one-byte range; some servers advertise Accept-Ranges
        // but answer 200 with the full body.
        match self.client.download_range(url, 0, 0).await {
            Ok(_probe) => {}
            Err(e) if e.is_range_not_supported() => {
                info!("range probe refused, falling back to single-stream");
                download_single(&self.client, &self.config, url, &output, cancel).await?;
                return Ok(output);
            }
            Err(e) => {
                warn!(error = %e, "range probe failed, attempting chunked anyway");
            }
        }

        match self
            .download_chunked(url, &output, content_length, cancel)
            .await
        {
            Ok(()) => Ok(output),
            Err(e) if e.is_range_not_supported() => {
                info!("server rejected ranged fetches, falling back to single-stream");
                download_single(&self.client, &self.config, url, &output, cancel).await?;
                Ok(output)
            }
            Err(e) => Err(e),
        }
    }

    /// Runs the chunked download plan against the temp file.
    async fn download_chunked(
        &self,
        url: &str,
        output: &Path,
        content_length: u64,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let mut chunks =
            partition_chunks(content_length, self.config.chunk_size, self.config.max_threads);
        let temp_path = state::temp_file_path(output);

        let mut resuming = false;
        if self.config.continue_download && temp_path.exists() {
            if state::load(output, &mut chunks)? {
                resuming = true;
            } else {
                // Temp data without a state file is unusable; start over.
                let _ = std::fs::remove_file(&temp_path);
            }
        } else {
            state::delete(output);
        }

        let file = if resuming {
            let file = std::fs::OpenOptions::new()
                .write(true)
                .open(&temp_path)
                .map_err(|e| DownloadError::io(temp_path.clone(), e))?;
            let actual = file
                .metadata()
                .map_err(|e| DownloadError::io(temp_path.clone(), e))?
                .len();
            let recorded: u64 = chunks.iter().map(|c| c.completed).sum();
            if actual != recorded {
                warn!(
                    actual,
                    recorded,
                    "temp file size disagrees with resume state, refetching missing ranges"
                );
            }
            info!(
                resumed_bytes = recorded,
                chunks = chunks.len(),
                "resuming chunked download"
            );
            file
        } else {
            std::fs::File::create(&temp_path)
                .map_err(|e| DownloadError::io(temp_path.clone(), e))?
        };

        debug!(
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            max_threads = self.config.max_threads,
            "chunk plan ready"
        );

        let file = Arc::new(file);
        let chunk_count = chunks.len();
        let chunks = Arc::new(Mutex::new(chunks));
        let semaphore = Arc::new(Semaphore::new(self.config.max_threads));
        let save_lock = Arc::new(tokio::sync::Mutex::new(()));
        let throttle = Throttle::new(self.config.limit_rate);

        let mut handles = Vec::with_capacity(chunk_count);
        for index in 0..chunk_count {
            let client = Arc::clone(&self.client);
            let url = url.to_string();
            let output = output.to_path_buf();
            let temp_path = temp_path.clone();
            let file = Arc::clone(&file);
            let chunks = Arc::clone(&chunks);
            let semaphore = Arc::clone(&semaphore);
            let save_lock = Arc::clone(&save_lock);
            let throttle = throttle.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                // Permit released when the task finishes (RAII).
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| DownloadError::Cancelled)?;

                let result = fetch_chunk(
                    &client, &url, &file, &temp_path, &chunks, index, &cancel, &throttle,
                )
                .await;

                {
                    let mut guard = lock_chunks(&chunks);
                    let chunk = &mut guard[index];
                    match &result {
                        Ok(()) => chunk.status = TransferStatus::Completed,
                        Err(DownloadError::Cancelled) => chunk.status = TransferStatus::Paused,
                        Err(e) => {
                            chunk.status = TransferStatus::Failed;
                            chunk.last_error = Some(e.to_string());
                        }
                    }
                }

                // Persist progress after every settled chunk; the lock keeps
                // at most one save in flight. A save failure is a warning,
                // never fatal.
                let _save_guard = save_lock.lock().await;
                let snapshot = lock_chunks(&chunks).clone();
                match tokio::task::spawn_blocking(move || state::save(&output, &snapshot)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "failed to persist resume state"),
                    Err(e) => warn!(error = %e, "resume state save task failed"),
                }

                result
            }));
        }

        let mut first_error: Option<DownloadError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    let prefer = first_error.is_none()
                        || (e.is_range_not_supported()
                            && !first_error
                                .as_ref()
                                .is_some_and(DownloadError::is_range_not_supported));
                    if prefer {
                        first_error = Some(e);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "chunk task panicked");
                    if first_error.is_none() {
                        first_error = Some(DownloadError::io(
                            temp_path.clone(),
                            std::io::Error::other(e.to_string()),
                        ));
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let actual = std::fs::metadata(&temp_path)
            .map_err(|e| DownloadError::io(temp_path.clone(), e))?
            .len();
        if actual != content_length {
            return Err(DownloadError::size_mismatch(
                temp_path.display().to_string(),
                content_length,
                actual,
            ));
        }

        state::delete(output);
        std::fs::rename(&temp_path, output).map_err(|e| DownloadError::io(output, e))?;
        info!(
            path = %output.display(),
            bytes = content_length,
            "chunked download complete"
        );
        Ok(())
    }
}

/// Decides whether a chunked download is worthwhile: a chunk size is
/// configured, the resource is larger than one chunk, and the server
/// advertises byte ranges.
#[must_use]
pub fn should_use_chunks(config: &Config, meta: &ResponseMeta) -> bool {
    #[allow(clippy::cast_possible_wrap)]
    let chunk_size = config.chunk_size as i64;
    chunk_size > 0 && meta.content_length > chunk_size && meta.accept_ranges
}

/// Partitions `[0, content_length)` into at most `max_threads` chunks.
///
/// The chunk count is `min(ceil(content_length / chunk_size), max_threads)`;
/// every chunk gets `content_length / n` bytes and the last chunk absorbs
/// the remainder, so the ranges cover the resource exactly with no gaps or
/// overlap.
#[must_use]
pub fn partition_chunks(content_length: u64, chunk_size: u64, max_threads: usize) -> Vec<Chunk> {
    let by_size = if chunk_size == 0 {
        1
    } else {
        content_length.div_ceil(chunk_size)
    };
    #[allow(clippy::cast_possible_truncation)]
    let count = (by_size.min(max_threads.max(1) as u64)).max(1) as usize;
    let per_chunk = content_length / count as u64;

    (0..count)
        .map(|index| {
            let start = index as u64 * per_chunk;
            let end = if index == count - 1 {
                content_length - 1
            } else {
                start + per_chunk - 1
            };
            Chunk::new(index, start, end)
        })
        .collect()
}

/// Fetches one chunk's missing byte range into the shared file.
#[allow(clippy::too_many_arguments)]
async fn fetch_chunk(
    client: &HttpClient,
    url: &str,
    file: &Arc<std::fs::File>,
    temp_path: &Path,
    chunks: &Arc<Mutex<Vec<Chunk>>>,
    index: usize,
    cancel: &CancellationToken,
    throttle: &Throttle,
) -> Result<(), DownloadError> {
    let (start, end, completed) = {
        let mut guard = lock_chunks(chunks);
        let chunk = &mut guard[index];
        if chunk.status == TransferStatus::Completed {
            return Ok(());
        }
        chunk.status = TransferStatus::Downloading;
        (chunk.start, chunk.end, chunk.completed)
    };

    let from = start + completed;
    if from > end {
        // Everything already on disk from a previous run.
        return Ok(());
    }
    let expected = end - from + 1;

    debug!(index, from, end, "fetching chunk range");
    let response = client.download_range(url, from, end).await?;
    if let Some(length) = response.content_length() {
        if length != expected {
            return Err(DownloadError::size_mismatch(
                format!("{url} bytes={from}-{end}"),
                expected,
                length,
            ));
        }
    }

    let mut stream = response.bytes_stream();
    let mut offset = from;
    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            item = stream.next() => item,
        };
        let Some(item) = item else { break };
        let bytes = item.map_err(|e| DownloadError::network(url, e))?;
        let len = bytes.len() as u64;

        write_all_at(file, temp_path, bytes, offset).await?;
        offset += len;
        {
            let mut guard = lock_chunks(chunks);
            guard[index].completed += len;
        }
        throttle.throttle(len).await;
    }

    let written = offset - from;
    if written != expected {
        return Err(DownloadError::size_mismatch(
            format!("{url} bytes={from}-{end}"),
            expected,
            written,
        ));
    }
    Ok(())
}

/// Writes `bytes` at an absolute offset in the shared file.
///
/// The handle is shared across chunk tasks, so writes go through the
/// platform positional-write primitive instead of seek-then-write; a shared
/// cursor would race.
async fn write_all_at(
    file: &Arc<std::fs::File>,
    temp_path: &Path,
    bytes: Bytes,
    offset: u64,
) -> Result<(), DownloadError> {
    let file = Arc::clone(file);
    let result = tokio::task::spawn_blocking(move || positional_write(&file, &bytes, offset)).await;
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DownloadError::io(temp_path, e)),
        Err(e) => Err(DownloadError::io(
            temp_path,
            std::io::Error::other(e.to_string()),
        )),
    }
}

#[cfg(unix)]
fn positional_write(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn positional_write(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0usize;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            ));
        }
        written += n;
    }
    Ok(())
}

fn lock_chunks(chunks: &Arc<Mutex<Vec<Chunk>>>) -> std::sync::MutexGuard<'_, Vec<Chunk>> {
    chunks.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves the final output path: explicit argument, then `output_file`,
/// then `output_document`, then a filename derived from the URL path
/// (`/` becomes `index.html`).
fn resolve_output_path(url: &str, explicit: Option<&Path>, config: &Config) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = &config.output_file {
        return path.clone();
    }
    if let Some(path) = &config.output_document {
        return path.clone();
    }
    PathBuf::from(filename_from_url(url))
}

/// Derives a safe filename from the last URL path segment.
fn filename_from_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "download".to_string();
    };
    let path = parsed.path();
    if path.is_empty() || path == "/" {
        return "index.html".to_string();
    }
    let name = path.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        return "index.html".to_string();
    }
    let decoded = urlencoding::decode(name)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| name.to_string());
    util::safe_file_name(&decoded)
}
