//! URL queue manager for the recursive crawler.
//!
//! A FIFO of jobs plus three auxiliary URL sets: `in_queue` (every URL ever
//! enqueued, for dedup), `visited` (marked after processing) and a
//! blacklist, along with the per-host robots.txt rule cache. All state sits
//! behind a single reader-writer lock; mutations take the write side and
//! queries the read side. During a crawl the queue is consumed
//! single-threaded.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use url::Url;

use super::job::Job;
use super::robots::RobotsRuleSet;

/// Errors from queue insertion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The URL is already queued or was already visited.
    #[error("URL already tracked: {url}")]
    Duplicate {
        /// The duplicate URL.
        url: String,
    },

    /// The URL is blacklisted.
    #[error("URL is blacklisted: {url}")]
    Blacklisted {
        /// The rejected URL.
        url: String,
    },
}

/// Aggregate queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Jobs currently waiting in the FIFO.
    pub queued: usize,
    /// URLs marked visited.
    pub visited: usize,
    /// Blacklisted URLs.
    pub blacklisted: usize,
    /// Hosts with a cached robots.txt rule set.
    pub hosts: usize,
}

#[derive(Debug, Default)]
struct QueueInner {
    jobs: VecDeque<Job>,
    in_queue: HashSet<String>,
    visited: HashSet<String>,
    blacklist: HashSet<String>,
    robots: HashMap<String, RobotsRuleSet>,
}

/// FIFO job queue with dedup, blacklist and per-host robots cache.
#[derive(Debug, Default)]
pub struct UrlQueue {
    inner: RwLock<QueueInner>,
}

impl UrlQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Blacklisted`] for blacklisted URLs and
    /// [`QueueError::Duplicate`] when the URL was already enqueued or
    /// visited; at most one job per URL ever enters the FIFO.
    pub fn add(&self, job: Job) -> Result<(), QueueError> {
        let mut inner = self.write();
        if inner.blacklist.contains(&job.url) {
            return Err(QueueError::Blacklisted { url: job.url });
        }
        if inner.in_queue.contains(&job.url) || inner.visited.contains(&job.url) {
            return Err(QueueError::Duplicate { url: job.url });
        }
        inner.in_queue.insert(job.url.clone());
        inner.jobs.push_back(job);
        Ok(())
    }

    /// Removes and returns the head job. The caller is expected to
    /// [`mark_visited`](Self::mark_visited) once processing finishes.
    #[must_use]
    pub fn pop(&self) -> Option<Job> {
        self.write().jobs.pop_front()
    }

    /// Returns a clone of the head job without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<Job> {
        self.read().jobs.front().cloned()
    }

    /// Removes a queued job by URL. Returns whether a job was removed.
    pub fn remove(&self, url: &str) -> bool {
        let mut inner = self.write();
        let before = inner.jobs.len();
        inner.jobs.retain(|job| job.url != url);
        let removed = inner.jobs.len() != before;
        if removed {
            inner.in_queue.remove(url);
        }
        removed
    }

    /// Marks a URL as visited; it can never be re-added afterwards.
    pub fn mark_visited(&self, url: &str) {
        self.write().visited.insert(url.to_string());
    }

    /// True when the URL was ever enqueued.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.read().in_queue.contains(url)
    }

    /// True when the URL has been visited.
    #[must_use]
    pub fn is_visited(&self, url: &str) -> bool {
        self.read().visited.contains(url)
    }

    /// Adds a URL to the blacklist.
    pub fn add_to_blacklist(&self, url: &str) {
        self.write().blacklist.insert(url.to_string());
    }

    /// True when the URL is blacklisted.
    #[must_use]
    pub fn is_blacklisted(&self, url: &str) -> bool {
        self.read().blacklist.contains(url)
    }

    /// Stores the robots.txt rule set for a host.
    pub fn set_robots(&self, host: &str, rules: RobotsRuleSet) {
        self.write().robots.insert(host.to_string(), rules);
    }

    /// True when a rule set is cached for the host.
    #[must_use]
    pub fn has_robots(&self, host: &str) -> bool {
        self.read().robots.contains_key(host)
    }

    /// Evaluates the cached robots policy for a URL.
    ///
    /// A URL whose host has no cached rule set is allowed; robots data is
    /// advisory, absence never blocks a crawl.
    #[must_use]
    pub fn is_allowed_by_robots(&self, url: &str, user_agent: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let Some(host) = parsed.host_str() else {
            return true;
        };
        let inner = self.read();
        match inner.robots.get(host) {
            Some(rules) => rules.is_allowed(url, user_agent),
            None => true,
        }
    }

    /// Number of jobs waiting in the FIFO.
    #[must_use]
    pub fn size(&self) -> usize {
        self.read().jobs.len()
    }

    /// True when no jobs are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().jobs.is_empty()
    }

    /// Clones the queued jobs at or below `max_level`.
    #[must_use]
    pub fn filter_by_level(&self, max_level: u32) -> Vec<Job> {
        self.read()
            .jobs
            .iter()
            .filter(|job| job.depth <= max_level)
            .cloned()
            .collect()
    }

    /// Deepest level currently queued.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.read()
            .jobs
            .iter()
            .map(|job| job.depth)
            .max()
            .unwrap_or(0)
    }

    /// Aggregate counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.read();
        QueueStats {
            queued: inner.jobs.len(),
            visited: inner.visited.len(),
            blacklisted: inner.blacklist.len(),
            hosts: inner.robots.len(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, QueueInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
