//! HTTP download engine.
//!
//! This module provides the HTTP client wrapper and the chunked download
//! engine: capability probing, chunk partitioning, bounded-concurrency
//! ranged fetches with crash-safe persisted resume state, post-download
//! size verification, and single-stream fallback for servers without
//! byte-range support.

mod chunk;
mod client;
mod error;
mod proxy;
mod single;
pub mod state;
mod throttle;

pub use chunk::{partition_chunks, should_use_chunks, ChunkDownloader};
pub use client::{HttpClient, ResponseMeta};
pub use error::DownloadError;
pub use proxy::ProxySelector;
pub use throttle::Throttle;

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by chunks and crawl jobs.
///
/// Transitions: `Pending → Downloading → (Completed | Failed | Paused)`.
/// `Failed` and `Paused` re-enter `Downloading` when a resumed run picks the
/// record up again; `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Waiting to be processed.
    Pending,
    /// A fetch task owns this record.
    Downloading,
    /// All bytes transferred and verified.
    Completed,
    /// Fetch gave up; kept for resume.
    Failed,
    /// Interrupted by cancellation; kept for resume.
    Paused,
}

/// A contiguous byte range of the remote resource, fetched by one task.
///
/// Invariants: `0 <= completed <= size`; the set of chunks partitions
/// `[0, content_length)` with no gaps or overlap; only the last chunk may
/// have a different size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the partition.
    pub index: usize,
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
    /// Total bytes in the range (`end - start + 1`).
    pub size: u64,
    /// Bytes written so far.
    pub completed: u64,
    /// Current lifecycle state.
    pub status: TransferStatus,
    /// Most recent fetch error, if any.
    #[serde(skip)]
    pub last_error: Option<String>,
}

impl Chunk {
    /// Creates a fresh pending chunk covering `start..=end`.
    #[must_use]
    pub fn new(index: usize, start: u64, end: u64) -> Self {
        Self {
            index,
            start,
            end,
            size: end - start + 1,
            completed: 0,
            status: TransferStatus::Pending,
            last_error: None,
        }
    }

    /// Bytes still missing from this chunk.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.completed)
    }

    /// Resets the chunk to a fresh pending state.
    pub fn reset(&mut self) {
        self.completed = 0;
        self.status = TransferStatus::Pending;
        self.last_error = None;
    }
}
