//! Recursive crawler.
//!
//! Walks a site breadth-first from a start URL: pops jobs from the URL
//! queue, honours per-host robots.txt policy, maps each URL into the output
//! directory, downloads text documents for parsing and binaries as streams,
//! feeds discovered URLs back into the queue, and finally hands saved
//! documents to the link rewriter when `--convert-links` is on.

mod job;
mod queue;
pub mod robots;

pub use job::{Job, JobFlags};
pub use queue::{QueueError, QueueStats, UrlQueue};
pub use robots::{RobotsRule, RobotsRuleSet};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::convert::{ConvertError, LinkRewriter};
use crate::download::{DownloadError, HttpClient, TransferStatus};
use crate::parse::{parse_css, parse_html, ParsedResult, ParsedUrl};
use crate::util;

/// Errors from a recursive crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A download operation failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Filesystem failure.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Link rewriting failed after the crawl.
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// The crawl was cancelled.
    #[error("crawl cancelled")]
    Cancelled,
}

impl CrawlError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Recursive site downloader.
pub struct Crawler {
    client: Arc<HttpClient>,
    config: Arc<Config>,
    queue: UrlQueue,
    rewriter: Mutex<LinkRewriter>,
    downloaded_files: Mutex<Vec<PathBuf>>,
    job_counter: AtomicU64,
}

impl Crawler {
    /// Creates a crawler sharing the given client and configuration.
    #[must_use]
    pub fn new(client: Arc<HttpClient>, config: Arc<Config>) -> Self {
        let backup = config.convert_links;
        Self {
            client,
            config,
            queue: UrlQueue::new(),
            rewriter: Mutex::new(LinkRewriter::new(".", backup)),
            downloaded_files: Mutex::new(Vec::new()),
            job_counter: AtomicU64::new(0),
        }
    }

    /// Crawls `start_url` into `output_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError`] on filesystem failures, on cancellation, and
    /// on per-job download failures unless `continue` is set (then failed
    /// jobs are skipped with a warning).
    #[instrument(skip(self, cancel), fields(url = %start_url, dir = %output_dir.display()))]
    pub async fn download(
        &self,
        start_url: &str,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), CrawlError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| CrawlError::io(output_dir, e))?;

        {
            let mut rewriter = self.lock_rewriter();
            rewriter.set_base_dir(output_dir);
            rewriter.set_backup(self.config.convert_links);
        }

        let mut seed = Job::new(self.next_job_id(), start_url, 0);
        seed.requested_by_user = true;
        if let Err(e) = self.queue.add(seed) {
            warn!(error = %e, "start URL rejected by queue");
        }

        while let Some(mut popped) = self.queue.pop() {
            if cancel.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            self.queue.mark_visited(&popped.url);

            if self.config.robots_txt {
                self.ensure_robots(&popped.url).await;
                if !self
                    .queue
                    .is_allowed_by_robots(&popped.url, &self.config.user_agent)
                {
                    info!(url = %popped.url, "denied by robots.txt, skipping");
                    continue;
                }
            }

            match self.process_job(&mut popped, output_dir, cancel).await {
                Ok(()) => popped.status = TransferStatus::Completed,
                Err(CrawlError::Cancelled) => return Err(CrawlError::Cancelled),
                Err(e) if self.config.continue_download => {
                    popped.status = TransferStatus::Failed;
                    warn!(url = %popped.url, error = %e, "job failed, continuing crawl");
                }
                Err(e) => return Err(e),
            }
        }

        if self.config.convert_links {
            self.lock_rewriter().convert_all()?;
        }

        let stats = self.queue.stats();
        info!(
            downloaded = self.downloaded_count(),
            visited = stats.visited,
            hosts = stats.hosts,
            "crawl complete"
        );
        Ok(())
    }

    /// Downloads one job and queues whatever its document links to.
    async fn process_job(
        &self,
        job: &mut Job,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), CrawlError> {
        let Some(output_path) = util::local_path_for_url(output_dir, &job.url) else {
            return Err(DownloadError::invalid_url(&job.url).into());
        };
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CrawlError::io(parent, e))?;
        }

        job.status = TransferStatus::Downloading;
        let meta = self.client.head(&job.url).await?;
        if !(200..300).contains(&meta.status) {
            return Err(DownloadError::http_status(&job.url, meta.status).into());
        }

        let content_type = meta
            .content_type
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let is_text = content_type.starts_with("text/html")
            || content_type.starts_with("text/css")
            || content_type.starts_with("application/xml");

        if is_text {
            self.fetch_text(job, &output_path, &content_type).await?;
        } else {
            self.fetch_binary(job, &output_path, cancel).await?;
        }

        job.output_path = Some(output_path.clone());
        self.lock_files().push(output_path.clone());

        if self.should_parse(job) {
            self.parse_and_queue(job, &output_path).await?;
        }
        Ok(())
    }

    /// Fetches an HTML/CSS/XML document fully into memory and to disk.
    async fn fetch_text(
        &self,
        job: &mut Job,
        output_path: &Path,
        content_type: &str,
    ) -> Result<(), CrawlError> {
        let response = self.client.get(&job.url, None).await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(DownloadError::http_status(&job.url, status).into());
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::network(&job.url, e))?;

        tokio::fs::write(output_path, &body)
            .await
            .map_err(|e| CrawlError::io(output_path, e))?;

        job.content_type = Some(content_type.to_string());
        job.encoding = "utf-8".to_string();
        debug!(url = %job.url, bytes = body.len(), path = %output_path.display(), "saved document");
        Ok(())
    }

    /// Streams a binary resource straight to disk.
    async fn fetch_binary(
        &self,
        job: &mut Job,
        output_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), CrawlError> {
        let response = self.client.get(&job.url, None).await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(DownloadError::http_status(&job.url, status).into());
        }

        let mut file = tokio::fs::File::create(output_path)
            .await
            .map_err(|e| CrawlError::io(output_path, e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        loop {
            let item = tokio::select! {
                () = cancel.cancelled() => return Err(CrawlError::Cancelled),
                item = stream.next() => item,
            };
            let Some(item) = item else { break };
            let bytes = item.map_err(|e| DownloadError::network(&job.url, e))?;
            file.write_all(&bytes)
                .await
                .map_err(|e| CrawlError::io(output_path, e))?;
            written += bytes.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| CrawlError::io(output_path, e))?;

        debug!(url = %job.url, bytes = written, path = %output_path.display(), "saved binary");
        Ok(())
    }

    /// Re-reads the saved document, extracts links, and queues them.
    async fn parse_and_queue(&self, job: &Job, output_path: &Path) -> Result<(), CrawlError> {
        let data = tokio::fs::read(output_path)
            .await
            .map_err(|e| CrawlError::io(output_path, e))?;

        let content_type = job.content_type.as_deref().unwrap_or_default();
        let result: Option<ParsedResult> = if content_type.starts_with("text/html") {
            let parsed = parse_html(&data, &job.url);
            if self.config.robots_txt && !parsed.follow {
                debug!(url = %job.url, "meta robots forbids following, stopping recursion here");
                return Ok(());
            }
            if self.config.convert_links {
                self.lock_rewriter()
                    .add_conversion(output_path, &job.url, parsed.clone());
            }
            Some(parsed)
        } else if content_type.starts_with("text/css") {
            Some(parse_css(&data, &job.url))
        } else {
            None
        };

        if let Some(result) = result {
            let within_depth = self.config.recursive_level == 0
                || job.depth < self.config.recursive_level;
            for parsed_url in &result.urls {
                self.queue_url(job, parsed_url, within_depth);
            }
        }
        Ok(())
    }

    /// Whether links found in this job's document should be traversed.
    ///
    /// On only for recursive crawls within the depth cap (`0` means
    /// unbounded); a page sitting exactly at the cap may still contribute
    /// its requisites when `--page-requisites` is set.
    fn should_parse(&self, job: &Job) -> bool {
        if !self.config.recursive {
            return false;
        }
        if self.config.recursive_level == 0 || job.depth < self.config.recursive_level {
            return true;
        }
        self.config.page_requisites && job.depth == self.config.recursive_level
    }

    /// Applies the queueing filter to one discovered URL.
    fn queue_url(&self, parent: &Job, parsed_url: &ParsedUrl, allow_non_requisites: bool) {
        let url = &parsed_url.url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return;
        }
        if self.queue.is_visited(url) || self.queue.contains(url) || self.queue.is_blacklisted(url)
        {
            return;
        }

        let requisite = (parsed_url.attr == "src" || parsed_url.attr == "href")
            && (parsed_url.tag == "img" || parsed_url.tag == "script");

        if !allow_non_requisites && !(requisite && self.config.page_requisites) {
            return;
        }

        let mut flags = JobFlags::RECURSIVE;
        if requisite {
            flags = flags.with(JobFlags::REQUISITE);
        }

        let mut job = Job::new(self.next_job_id(), url.clone(), parent.depth + 1);
        job.parent_id = parent.id;
        job.flags = flags;
        if let Err(e) = self.queue.add(job) {
            debug!(url = %url, error = %e, "discovered URL not queued");
        }
    }

    /// Fetches and caches robots.txt for the URL's host, once per host.
    ///
    /// Fetch failures cache an empty rule set (allow everything); robots
    /// data is advisory and never aborts a crawl.
    async fn ensure_robots(&self, url: &str) {
        let Ok(parsed) = Url::parse(url) else { return };
        let Some(host) = parsed.host_str().map(ToString::to_string) else {
            return;
        };
        if self.queue.has_robots(&host) {
            return;
        }

        let Ok(robots_url) = parsed.join("/robots.txt") else {
            self.queue.set_robots(&host, RobotsRuleSet::default());
            return;
        };

        let rules = match self.client.get(robots_url.as_str(), None).await {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(body) => {
                    let rules = RobotsRuleSet::parse(&body);
                    debug!(host = %host, rules = rules.rules.len(), "parsed robots.txt");
                    rules
                }
                Err(e) => {
                    debug!(host = %host, error = %e, "failed to read robots.txt body");
                    RobotsRuleSet::default()
                }
            },
            Ok(response) => {
                debug!(host = %host, status = response.status().as_u16(), "no robots.txt");
                RobotsRuleSet::default()
            }
            Err(e) => {
                debug!(host = %host, error = %e, "failed to fetch robots.txt");
                RobotsRuleSet::default()
            }
        };
        self.queue.set_robots(&host, rules);
    }

    /// Paths written during this crawl.
    #[must_use]
    pub fn downloaded_files(&self) -> Vec<PathBuf> {
        self.lock_files().clone()
    }

    /// Number of files written during this crawl.
    #[must_use]
    pub fn downloaded_count(&self) -> usize {
        self.lock_files().len()
    }

    /// Queue counters for reporting.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    fn next_job_id(&self) -> u64 {
        self.job_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock_rewriter(&self) -> std::sync::MutexGuard<'_, LinkRewriter> {
        self.rewriter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_files(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.downloaded_files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn crawler_with(config: Config) -> Crawler {
        let config = Arc::new(config);
        let client = Arc::new(HttpClient::new(Arc::clone(&config)).unwrap());
        Crawler::new(client, config)
    }

    #[test]
    fn test_should_parse_depth_gate() {
        let crawler = crawler_with(Config {
            recursive: true,
            recursive_level: 2,
            ..Config::default()
        });
        assert!(crawler.should_parse(&Job::new(1, "https://e.com/", 0)));
        assert!(crawler.should_parse(&Job::new(2, "https://e.com/a", 1)));
        assert!(!crawler.should_parse(&Job::new(3, "https://e.com/b", 2)));
        assert!(!crawler.should_parse(&Job::new(4, "https://e.com/c", 3)));
    }

    #[test]
    fn test_should_parse_unbounded_level() {
        let crawler = crawler_with(Config {
            recursive: true,
            recursive_level: 0,
            ..Config::default()
        });
        assert!(crawler.should_parse(&Job::new(1, "https://e.com/", 40)));
    }

    #[test]
    fn test_should_parse_requires_recursive() {
        let crawler = crawler_with(Config::default());
        assert!(!crawler.should_parse(&Job::new(1, "https://e.com/", 0)));
    }

    #[test]
    fn test_should_parse_requisites_at_cap() {
        let crawler = crawler_with(Config {
            recursive: true,
            recursive_level: 2,
            page_requisites: true,
            ..Config::default()
        });
        assert!(crawler.should_parse(&Job::new(1, "https://e.com/", 2)));
        assert!(!crawler.should_parse(&Job::new(2, "https://e.com/", 3)));
    }

    #[test]
    fn test_queue_url_filters_non_http() {
        let crawler = crawler_with(Config {
            recursive: true,
            ..Config::default()
        });
        let parent = Job::new(1, "https://e.com/", 0);
        crawler.queue_url(
            &parent,
            &ParsedUrl {
                url: "ftp://e.com/file".to_string(),
                attr: "href".to_string(),
                tag: "a".to_string(),
            },
            true,
        );
        assert!(crawler.queue.is_empty());
    }

    #[test]
    fn test_queue_url_flags_requisites_and_dedups() {
        let crawler = crawler_with(Config {
            recursive: true,
            ..Config::default()
        });
        let parent = Job::new(1, "https://e.com/", 0);
        let img = ParsedUrl {
            url: "https://e.com/logo.png".to_string(),
            attr: "src".to_string(),
            tag: "img".to_string(),
        };
        crawler.queue_url(&parent, &img, true);
        crawler.queue_url(&parent, &img, true);

        assert_eq!(crawler.queue.size(), 1);
        let job = crawler.queue.pop().expect("job queued");
        assert!(job.flags.contains(JobFlags::REQUISITE));
        assert!(job.flags.contains(JobFlags::RECURSIVE));
        assert_eq!(job.depth, 1);
        assert_eq!(job.parent_id, 1);
    }

    #[test]
    fn test_queue_url_beyond_depth_only_requisites() {
        let crawler = crawler_with(Config {
            recursive: true,
            page_requisites: true,
            ..Config::default()
        });
        let parent = Job::new(1, "https://e.com/", 5);

        crawler.queue_url(
            &parent,
            &ParsedUrl {
                url: "https://e.com/next.html".to_string(),
                attr: "href".to_string(),
                tag: "a".to_string(),
            },
            false,
        );
        assert!(crawler.queue.is_empty());

        crawler.queue_url(
            &parent,
            &ParsedUrl {
                url: "https://e.com/logo.png".to_string(),
                attr: "src".to_string(),
                tag: "img".to_string(),
            },
            false,
        );
        assert_eq!(crawler.queue.size(), 1);
    }
}
