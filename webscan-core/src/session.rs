use crate::aggregate::{Aggregator, FindingsReport};
use crate::login::{FormLogin, LoginFlow};
use crate::probe::{DomRenderer, ProbeContext, ProbeSet};
use crate::target::{ConfigError, Target};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;
use webscan_scanner::crawler::{Crawler, ProgressCallback};
use webscan_scanner::error::ScanError;
use webscan_scanner::fetch::{Fetcher, FetcherConfig, HttpFetcher};
use webscan_scanner::politeness::PolitenessLimiter;
use webscan_scanner::result::Page;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scanner(#[from] ScanError),

    #[error("Could not start the async runtime: {0}")]
    Runtime(String),
}

/// Owns everything one scan needs: the fetcher and its cookie jar, the crawler with its
/// frontier and robots cache, and the probe set. Built per scan and dropped afterwards.
pub struct ScanSession {
    scan_id: Uuid,
    target: Arc<Target>,
    fetcher: Arc<dyn Fetcher>,
    probes: ProbeSet,
    dom: Option<Arc<dyn DomRenderer>>,
    login: Arc<dyn LoginFlow>,
    progress_callback: Option<ProgressCallback>,
}

impl ScanSession {
    pub fn new(target: Target) -> Result<Self, SessionError> {
        let fetcher = HttpFetcher::new(&FetcherConfig {
            user_agent: target.user_agent.clone(),
            timeout: target.request_timeout,
        })?;
        Ok(Self::with_fetcher(target, Arc::new(fetcher)))
    }

    /// Use a different fetch implementation, such as a browser-driven one.
    pub fn with_fetcher(target: Target, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            target: Arc::new(target),
            fetcher,
            probes: ProbeSet::standard(),
            dom: None,
            login: Arc::new(FormLogin),
            progress_callback: None,
        }
    }

    pub fn with_probes(mut self, probes: ProbeSet) -> Self {
        self.probes = probes;
        self
    }

    pub fn with_dom_renderer(mut self, renderer: Arc<dyn DomRenderer>) -> Self {
        self.dom = Some(renderer);
        self
    }

    pub fn with_login_flow(mut self, login: Arc<dyn LoginFlow>) -> Self {
        self.login = login;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    pub async fn run(self) -> Result<FindingsReport, SessionError> {
        let started_at = Utc::now();
        let target = self.target.clone();
        info!("Scan {} of {} started", self.scan_id, target.url);

        if let Some(ref credentials) = target.credentials
            && let Err(e) = self.login.login(self.fetcher.as_ref(), credentials).await
        {
            warn!("Login failed, continuing unauthenticated: {}", e);
        }

        // crawl and detector requests share one per-origin schedule
        let politeness = Arc::new(PolitenessLimiter::new(target.politeness_delay));

        let crawl = self
            .build_crawler(politeness.clone())
            .crawl(target.url.as_str(), target.worker_count)
            .await?;
        if crawl.deadline_hit {
            warn!("Crawl deadline reached, probing the {} pages collected so far", crawl.pages.len());
        }

        let pages: Vec<Arc<Page>> = crawl.pages.into_iter().map(Arc::new).collect();

        let mut ctx =
            ProbeContext::new(target.clone(), self.fetcher.clone()).with_politeness(politeness);
        if let Some(dom) = self.dom.clone() {
            ctx = ctx.with_dom_renderer(dom);
        }
        let results = self.probes.run(&pages, &ctx).await;

        let mut report = Aggregator::new(self.scan_id.to_string(), target.url.as_str(), started_at)
            .aggregate(&pages, results);
        report.deadline_hit = crawl.deadline_hit;

        info!(
            "Scan {} finished: {} pages, {} findings",
            self.scan_id,
            report.pages_scanned,
            report.findings.len()
        );
        Ok(report)
    }

    fn build_crawler(&self, politeness: Arc<PolitenessLimiter>) -> Crawler {
        let target = &self.target;
        let mut crawler = Crawler::new(self.fetcher.clone())
            .with_max_pages(target.max_pages)
            .with_politeness(politeness)
            .with_exclusions(&target.crawl_exclusions)
            .with_robots_user_agent(&target.user_agent)
            .with_respect_robots(target.respect_robots);

        if let Some(depth) = target.max_depth {
            crawler = crawler.with_max_depth(depth);
        }
        if let Some(limit) = target.max_duration {
            crawler = crawler.with_max_duration(limit);
        }
        if let Some(ref callback) = self.progress_callback {
            crawler = crawler.with_progress_callback(callback.clone());
        }
        crawler
    }
}

/// Crawl and probe `target` with the standard detectors.
pub async fn run_scan(target: Target) -> Result<FindingsReport, SessionError> {
    ScanSession::new(target)?.run().await
}

/// `run_scan` for callers without a runtime. Must not be called from inside one.
pub fn run_scan_blocking(target: Target) -> Result<FindingsReport, SessionError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| SessionError::Runtime(e.to_string()))?;
    runtime.block_on(run_scan(target))
}
