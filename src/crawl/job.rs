//! Crawl job types.

use std::path::PathBuf;

use crate::download::TransferStatus;

/// Bit flags annotating a crawl job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobFlags(u32);

impl JobFlags {
    /// No annotation.
    pub const NONE: Self = Self(0);
    /// The job came from following a redirect.
    pub const REDIRECTION: Self = Self(1);
    /// The job is a page requisite (image, script, stylesheet).
    pub const REQUISITE: Self = Self(1 << 1);
    /// The job was produced by recursive traversal.
    pub const RECURSIVE: Self = Self(1 << 2);

    /// True when every flag in `other` is set on `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `self` with the flags in `other` added.
    #[must_use]
    pub fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A single crawl unit: one URL and its bookkeeping.
///
/// Owned by the URL queue from insertion until popped; after the pop the
/// processing task owns it until it reaches a terminal status.
#[derive(Debug, Clone)]
pub struct Job {
    /// Monotonic job id.
    pub id: u64,
    /// Id of the job whose document produced this URL (0 for seeds).
    pub parent_id: u64,
    /// Absolute URL to fetch.
    pub url: String,
    /// Where the body was written, once known.
    pub output_path: Option<PathBuf>,
    /// Crawl depth (0 for the start URL).
    pub depth: u32,
    /// Redirect hops taken to reach the URL.
    pub redirect_depth: u32,
    /// Annotations driving requisite/recursion decisions.
    pub flags: JobFlags,
    /// Lifecycle state.
    pub status: TransferStatus,
    /// Content type reported by the server.
    pub content_type: Option<String>,
    /// Document encoding (defaults to `utf-8`).
    pub encoding: String,
    /// True for sitemap documents.
    pub is_sitemap: bool,
    /// True for robots.txt documents.
    pub is_robots_txt: bool,
    /// True when the URL was given by the user rather than discovered.
    pub requested_by_user: bool,
}

impl Job {
    /// Creates a pending job.
    #[must_use]
    pub fn new(id: u64, url: impl Into<String>, depth: u32) -> Self {
        Self {
            id,
            parent_id: 0,
            url: url.into(),
            output_path: None,
            depth,
            redirect_depth: 0,
            flags: JobFlags::NONE,
            status: TransferStatus::Pending,
            content_type: None,
            encoding: "utf-8".to_string(),
            is_sitemap: false,
            is_robots_txt: false,
            requested_by_user: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_contains_and_with() {
        let flags = JobFlags::NONE.with(JobFlags::REQUISITE);
        assert!(flags.contains(JobFlags::REQUISITE));
        assert!(!flags.contains(JobFlags::RECURSIVE));

        let both = flags.with(JobFlags::RECURSIVE);
        assert!(both.contains(JobFlags::REQUISITE));
        assert!(both.contains(JobFlags::RECURSIVE));
        assert!(both.contains(JobFlags::NONE));
    }

    #[test]
    fn test_new_job_defaults() {
        let job = Job::new(7, "https://example.com/", 2);
        assert_eq!(job.id, 7);
        assert_eq!(job.depth, 2);
        assert_eq!(job.status, TransferStatus::Pending);
        assert_eq!(job.encoding, "utf-8");
        assert!(!job.requested_by_user);
    }
}
