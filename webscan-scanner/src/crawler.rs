use crate::error::{Result, ScanError};
use crate::fetch::{DEFAULT_USER_AGENT, FetchRequest, Fetcher, Response};
use crate::frontier::{Frontier, FrontierEntry, PushOutcome};
use crate::parser::PageParser;
use crate::politeness::PolitenessLimiter;
use crate::result::{CrawlReport, CrawlState, CrawlStats, Page, SkipReason, UrlOutcome};
use crate::robots::RobotsGate;
use crate::scope::{Scope, normalize_url};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

pub const DEFAULT_MAX_PAGES: usize = 200;
pub const DEFAULT_POLITENESS_DELAY: Duration = Duration::from_millis(500);
/// Links whose path or query contains one of these are never followed, so an
/// authenticated crawl does not end its own session.
pub const DEFAULT_CRAWL_EXCLUSIONS: &[&str] = &["logout", "signout", "logoff"];

/// Same-origin breadth-first crawler with a fixed worker pool.
pub struct Crawler {
    fetcher: Arc<dyn Fetcher>,
    robots: Option<Arc<RobotsGate>>,
    politeness: Arc<PolitenessLimiter>,
    exclusions: Arc<[String]>,
    max_pages: usize,
    max_depth: Option<usize>,
    max_duration: Option<Duration>,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        let robots = RobotsGate::new(fetcher.clone(), DEFAULT_USER_AGENT);
        Self {
            fetcher,
            robots: Some(Arc::new(robots)),
            politeness: Arc::new(PolitenessLimiter::new(DEFAULT_POLITENESS_DELAY)),
            exclusions: DEFAULT_CRAWL_EXCLUSIONS.iter().map(|p| p.to_string()).collect(),
            max_pages: DEFAULT_MAX_PAGES,
            max_depth: None,
            max_duration: None,
            progress_callback: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness = Arc::new(PolitenessLimiter::new(delay));
        self
    }

    /// Share a limiter with other request sources so they are spaced together.
    pub fn with_politeness(mut self, politeness: Arc<PolitenessLimiter>) -> Self {
        self.politeness = politeness;
        self
    }

    /// Replace the crawl exclusions. Matching is a case-insensitive substring test on
    /// the link's path and query.
    pub fn with_exclusions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclusions = patterns
            .into_iter()
            .map(|p| p.as_ref().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        self
    }

    /// Robots rules are matched against `user_agent`'s own group as well as `*`.
    pub fn with_robots_user_agent(mut self, user_agent: &str) -> Self {
        if self.robots.is_some() {
            self.robots = Some(Arc::new(RobotsGate::new(self.fetcher.clone(), user_agent)));
        }
        self
    }

    pub fn with_respect_robots(mut self, respect: bool) -> Self {
        if !respect {
            self.robots = None;
        } else if self.robots.is_none() {
            self.robots = Some(Arc::new(RobotsGate::new(
                self.fetcher.clone(),
                DEFAULT_USER_AGENT,
            )));
        }
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub async fn crawl(&self, start_url: &str, workers: usize) -> Result<CrawlReport> {
        let workers = workers.max(1);
        info!("Starting crawl of {} with {} workers", start_url, workers);

        let seed = Url::parse(start_url)
            .map_err(|e| ScanError::InvalidUrl(format!("Invalid URL: {}", e)))?;
        if seed.scheme() != "http" && seed.scheme() != "https" {
            return Err(ScanError::InvalidUrl(format!(
                "Unsupported scheme: {}",
                seed.scheme()
            )));
        }
        let scope = Arc::new(Scope::new(&seed));

        let frontier = Arc::new(Frontier::new(self.max_pages));
        let pages: Arc<Mutex<Vec<Page>>> = Arc::new(Mutex::new(Vec::new()));
        let outcomes: Arc<Mutex<Vec<UrlOutcome>>> = Arc::new(Mutex::new(Vec::new()));

        if frontier.push(normalize_url(&seed), 0) == PushOutcome::OverLimit {
            outcomes.lock().await.push(UrlOutcome {
                url: normalize_url(&seed),
                depth: 0,
                state: CrawlState::Skipped(SkipReason::OverLimit),
            });
        }

        let watchdog = self.max_duration.map(|limit| {
            let frontier = frontier.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                info!("Crawl deadline of {:?} reached, stopping", limit);
                frontier.close();
            })
        });

        let mut worker_handles = Vec::new();

        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                fetcher: self.fetcher.clone(),
                robots: self.robots.clone(),
                politeness: self.politeness.clone(),
                exclusions: self.exclusions.clone(),
                scope: scope.clone(),
                frontier: frontier.clone(),
                pages: pages.clone(),
                outcomes: outcomes.clone(),
                max_depth: self.max_depth,
                progress_cb: self.progress_callback.clone(),
            };

            worker_handles.push(tokio::spawn(worker.run()));
        }

        // Wait for all workers to complete
        for handle in worker_handles {
            handle.await?;
        }
        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let mut outcomes = std::mem::take(&mut *outcomes.lock().await);
        outcomes.extend(frontier.take_skipped());
        let pages = std::mem::take(&mut *pages.lock().await);
        let stats = Self::stats(&outcomes);
        let deadline_hit = frontier.was_interrupted();

        info!(
            "Crawl complete. Fetched {} pages ({} failed, {} disallowed, {} skipped)",
            stats.fetched, stats.failed, stats.disallowed, stats.skipped
        );

        Ok(CrawlReport {
            pages,
            outcomes,
            stats,
            deadline_hit,
        })
    }

    fn stats(outcomes: &[UrlOutcome]) -> CrawlStats {
        let mut stats = CrawlStats::default();
        for outcome in outcomes {
            match outcome.state {
                CrawlState::Parsed => stats.fetched += 1,
                CrawlState::FetchFailed => {
                    stats.fetched += 1;
                    stats.failed += 1;
                }
                CrawlState::Disallowed => stats.disallowed += 1,
                CrawlState::Skipped(_) => stats.skipped += 1,
                CrawlState::Queued | CrawlState::Fetching => {}
            }
        }
        stats
    }
}

struct Worker {
    id: usize,
    fetcher: Arc<dyn Fetcher>,
    robots: Option<Arc<RobotsGate>>,
    politeness: Arc<PolitenessLimiter>,
    exclusions: Arc<[String]>,
    scope: Arc<Scope>,
    frontier: Arc<Frontier>,
    pages: Arc<Mutex<Vec<Page>>>,
    outcomes: Arc<Mutex<Vec<UrlOutcome>>>,
    max_depth: Option<usize>,
    progress_cb: Option<ProgressCallback>,
}

impl Worker {
    async fn run(self) {
        debug!("Worker {} started", self.id);

        // URLs this worker already reported as skipped at discovery time
        let mut reported_skips = HashSet::new();

        while let Some((entry, _claim)) = self.frontier.next().await {
            if let Some(ref callback) = self.progress_cb {
                callback(self.id, entry.url.clone());
            }

            let state = self.visit(&entry, &mut reported_skips).await;
            self.record(&entry, state).await;
        }

        debug!("Worker {} finished", self.id);
    }

    async fn visit(&self, entry: &FrontierEntry, reported_skips: &mut HashSet<String>) -> CrawlState {
        let url = match Url::parse(&entry.url) {
            Ok(url) => url,
            Err(e) => {
                warn!("Dropping unparsable frontier entry {}: {}", entry.url, e);
                self.pages.lock().await.push(Page::with_error(
                    entry.url.clone(),
                    entry.depth,
                    e.to_string(),
                ));
                return CrawlState::FetchFailed;
            }
        };

        if let Some(ref robots) = self.robots
            && !robots.is_allowed(&url).await
        {
            debug!("[Worker {}] {} disallowed by robots.txt", self.id, entry.url);
            return CrawlState::Disallowed;
        }

        self.politeness.wait(&url).await;

        match self.fetcher.fetch(FetchRequest::get(url)).await {
            Ok(response) => {
                // redirects may have moved the request elsewhere
                let landed = match Url::parse(&response.url) {
                    Ok(landed) if self.scope.is_in_scope(&landed) => normalize_url(&landed),
                    _ => {
                        warn!("{} left the crawl scope for {}", entry.url, response.url);
                        return CrawlState::Skipped(SkipReason::OffOrigin);
                    }
                };
                if landed != entry.url && !self.frontier.mark_visited(&landed) {
                    debug!(
                        "[Worker {}] {} redirected to already visited {}",
                        self.id, entry.url, landed
                    );
                    return CrawlState::Skipped(SkipReason::Duplicate);
                }

                let page = build_page(entry, landed, response, &self.scope);
                self.enqueue_links(&page, reported_skips).await;
                self.pages.lock().await.push(page);
                CrawlState::Parsed
            }
            Err(e) => {
                warn!("Crawl error for {}: {}", entry.url, e);
                self.pages.lock().await.push(Page::with_error(
                    entry.url.clone(),
                    entry.depth,
                    e.to_string(),
                ));
                CrawlState::FetchFailed
            }
        }
    }

    async fn enqueue_links(&self, page: &Page, reported_skips: &mut HashSet<String>) {
        let depth = page.depth + 1;
        let mut skipped = Vec::new();

        for link in &page.links {
            let reason = if is_excluded(link, &self.exclusions) {
                debug!("[Worker {}] Not following excluded link {}", self.id, link);
                Some(SkipReason::Excluded)
            } else if self.max_depth.is_some_and(|max| depth > max) {
                Some(SkipReason::Depth)
            } else {
                match self.frontier.push(link.clone(), depth) {
                    PushOutcome::Queued => {
                        debug!("[Worker {}] Queued {} at depth {}", self.id, link, depth);
                        None
                    }
                    PushOutcome::Duplicate => None,
                    PushOutcome::OverLimit => Some(SkipReason::OverLimit),
                }
            };

            if let Some(reason) = reason
                && reported_skips.insert(link.clone())
            {
                skipped.push(UrlOutcome {
                    url: link.clone(),
                    depth,
                    state: CrawlState::Skipped(reason),
                });
            }
        }

        if !skipped.is_empty() {
            self.outcomes.lock().await.extend(skipped);
        }
    }

    async fn record(&self, entry: &FrontierEntry, state: CrawlState) {
        self.outcomes.lock().await.push(UrlOutcome {
            url: entry.url.clone(),
            depth: entry.depth,
            state,
        });
    }
}

fn is_excluded(link: &str, exclusions: &[String]) -> bool {
    let Ok(url) = Url::parse(link) else {
        return false;
    };
    let mut target = url.path().to_lowercase();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(&query.to_lowercase());
    }
    exclusions.iter().any(|pattern| target.contains(pattern.as_str()))
}

/// Turn a response into an immutable Page keyed by the URL it was served from. Only
/// HTML bodies are parsed, and only same-origin links are kept.
fn build_page(entry: &FrontierEntry, url: String, response: Response, scope: &Scope) -> Page {
    let mut page = Page::new(url, entry.depth);
    page.status_code = response.status_code;
    page.content_type = response.content_type().map(str::to_string);
    page.body_length = response.body.len();
    page.response_time = response.elapsed;
    page.has_html = response.is_html();

    if page.has_html {
        let facts = PageParser::parse(&response.body, &response.url);
        page.links = facts
            .links
            .into_iter()
            .filter(|link| scope.is_in_scope_str(link))
            .collect();
        page.forms = facts.forms;
        page.signals = facts.signals;
    }

    page.headers = response.headers;
    page.body = response.body;
    page
}
