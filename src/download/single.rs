//! Single-stream download path.
//!
//! Used when chunking is disabled, the resource is small, or the server
//! lacks byte-range support. Supports resume via `Range: bytes=<size>-`
//! when the output file already holds partial data: a `206` answer appends,
//! a `200` answer truncates and refetches from scratch.

use std::path::Path;

use futures_util::StreamExt;
use reqwest::header::CONTENT_ENCODING;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DownloadError, HttpClient, Throttle};
use crate::config::Config;

/// Streams `url` into `output`, resuming when possible.
///
/// The client forces `Accept-Encoding: identity`, so bodies normally arrive
/// raw. A server that sends a `Content-Encoding` anyway gets its bytes
/// copied verbatim with a warning, and length verification is skipped for
/// that response (the header length describes the encoded form).
///
/// # Errors
///
/// Returns [`DownloadError`] on transport failures, unexpected statuses,
/// length mismatches, filesystem errors, or cancellation.
pub(super) async fn download_single(
    client: &HttpClient,
    config: &Config,
    url: &str,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<(), DownloadError> {
    let throttle = Throttle::new(config.limit_rate);

    let mut existing = 0u64;
    if config.continue_download {
        if let Ok(meta) = std::fs::metadata(output) {
            existing = meta.len();
        }
    }
    let range_header = (existing > 0).then(|| format!("bytes={existing}-"));

    let response = client.get(url, range_header.as_deref()).await?;
    let status = response.status().as_u16();

    let resuming = match (range_header.is_some(), status) {
        (true, 206) => {
            debug!(offset = existing, "server honoured resume range");
            true
        }
        (true, 200) => {
            debug!("server ignored resume range, restarting from scratch");
            false
        }
        (false, 200) => false,
        (_, other) => return Err(DownloadError::http_status(url, other)),
    };

    let content_encoding = response
        .headers()
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);
    let identity = content_encoding
        .as_deref()
        .is_none_or(|e| e.is_empty() || e == "identity");
    if !identity {
        warn!(
            encoding = content_encoding.as_deref().unwrap_or_default(),
            "server sent an encoded body despite identity request; copying raw, skipping length verification"
        );
    }

    let expected = response.content_length();

    let mut file = if resuming {
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(output)
            .await
            .map_err(|e| DownloadError::io(output, e))?
    } else {
        tokio::fs::File::create(output)
            .await
            .map_err(|e| DownloadError::io(output, e))?
    };

    let mut stream = response.bytes_stream();
    let mut copied = 0u64;
    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => {
                let _ = file.flush().await;
                return Err(DownloadError::Cancelled);
            }
            item = stream.next() => item,
        };
        let Some(item) = item else { break };
        let bytes = item.map_err(|e| DownloadError::network(url, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| DownloadError::io(output, e))?;
        copied += bytes.len() as u64;
        throttle.throttle(bytes.len() as u64).await;
    }
    file.flush()
        .await
        .map_err(|e| DownloadError::io(output, e))?;

    if identity {
        if let Some(expected) = expected {
            if expected > 0 && copied != expected {
                return Err(DownloadError::size_mismatch(
                    output.display().to_string(),
                    expected,
                    copied,
                ));
            }
        }
    }

    info!(
        path = %output.display(),
        bytes = copied,
        resumed = resuming,
        "single-stream download complete"
    );
    Ok(())
}
