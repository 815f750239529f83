// Detectors and the probe set that fans pages out to them

pub mod auth;
pub mod idor;
pub mod similarity;
pub mod sqli;
pub mod xss;

use crate::finding::Finding;
use crate::target::Target;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;
use webscan_scanner::error::FetchError;
use webscan_scanner::fetch::{FetchRequest, Fetcher, Response};
use webscan_scanner::politeness::PolitenessLimiter;
use webscan_scanner::result::Page;

pub use auth::AuthSessionDetector;
pub use idor::IdorDetector;
pub use sqli::SqlInjectionDetector;
pub use xss::XssDetector;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Page URL is not usable: {0}")]
    InvalidUrl(String),

    #[error("DOM renderer failed: {0}")]
    Render(String),

    #[error("Comparison task failed: {0}")]
    Task(String),
}

/// What a browser produced after loading a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDom {
    pub final_dom_html: String,
    pub alert_triggered: bool,
}

/// Optional browser-automation collaborator used for DOM-based XSS confirmation.
#[async_trait]
pub trait DomRenderer: Send + Sync {
    async fn render_and_capture(&self, url: &Url) -> Result<RenderedDom, ProbeError>;
}

/// Everything a detector may consult besides the page itself.
///
/// Detectors send their own requests through `fetch` and `render`, which wait on the
/// per-origin politeness limiter first.
#[derive(Clone)]
pub struct ProbeContext {
    pub target: Arc<Target>,
    pub fetcher: Arc<dyn Fetcher>,
    pub dom: Option<Arc<dyn DomRenderer>>,
    pub politeness: Arc<PolitenessLimiter>,
}

impl ProbeContext {
    /// Uses a limiter of its own with the target's politeness delay.
    pub fn new(target: Arc<Target>, fetcher: Arc<dyn Fetcher>) -> Self {
        let politeness = Arc::new(PolitenessLimiter::new(target.politeness_delay));
        Self {
            target,
            fetcher,
            dom: None,
            politeness,
        }
    }

    pub fn with_dom_renderer(mut self, renderer: Arc<dyn DomRenderer>) -> Self {
        self.dom = Some(renderer);
        self
    }

    /// Share the crawl's limiter so crawl and detector requests are spaced together.
    pub fn with_politeness(mut self, politeness: Arc<PolitenessLimiter>) -> Self {
        self.politeness = politeness;
        self
    }

    pub async fn fetch(&self, request: FetchRequest) -> Result<Response, FetchError> {
        self.politeness.wait(&request.url).await;
        self.fetcher.fetch(request).await
    }

    /// `None` when no DOM renderer is configured.
    pub async fn render(&self, url: &Url) -> Option<Result<RenderedDom, ProbeError>> {
        let dom = self.dom.as_ref()?;
        self.politeness.wait(url).await;
        Some(dom.render_and_capture(url).await)
    }
}

/// A single vulnerability check. Implementations read the page and never change it;
/// given the same page and context they return the same findings.
#[async_trait]
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    async fn detect(&self, page: &Page, ctx: &ProbeContext) -> Result<Vec<Finding>, ProbeError>;
}

#[derive(Debug, Clone)]
pub struct DetectorFindings {
    pub detector: &'static str,
    pub findings: Vec<Finding>,
}

/// Findings for one page, one entry per registered detector in registration order.
#[derive(Debug, Clone)]
pub struct PageFindings {
    pub page_url: String,
    pub by_detector: Vec<DetectorFindings>,
}

/// Query parameters of a page URL in order, or an empty list when the URL has none.
pub(crate) fn query_pairs(page_url: &str) -> Vec<(String, String)> {
    Url::parse(page_url)
        .map(|u| u.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

/// `url` with the `index`th query parameter's value replaced.
pub(crate) fn with_param_value(url: &Url, index: usize, value: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .enumerate()
        .map(|(i, (k, v))| if i == index { (k, value.to_string()) } else { (k, v) })
        .collect();

    let mut mutated = url.clone();
    mutated.query_pairs_mut().clear().extend_pairs(pairs);
    mutated
}

pub struct ProbeSet {
    detectors: Vec<Arc<dyn Detector>>,
}

impl ProbeSet {
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// XSS, SQL injection, auth/session and IDOR, in that order.
    pub fn standard() -> Self {
        Self::new()
            .with_detector(XssDetector)
            .with_detector(SqlInjectionDetector)
            .with_detector(AuthSessionDetector)
            .with_detector(IdorDetector)
    }

    pub fn with_detector(mut self, detector: impl Detector + 'static) -> Self {
        self.detectors.push(Arc::new(detector));
        self
    }

    pub fn detector_names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector against every fetched page in parallel and wait for all of
    /// them. Pages whose fetch failed are skipped. A detector that errors or panics
    /// contributes no findings for that page.
    pub async fn run(&self, pages: &[Arc<Page>], ctx: &ProbeContext) -> Vec<PageFindings> {
        let permits = Arc::new(Semaphore::new(ctx.target.worker_count.max(1)));
        let mut page_handles = Vec::new();

        for page in pages.iter().filter(|p| !p.is_fetch_failed()) {
            let mut handles = Vec::new();
            for detector in &self.detectors {
                let name = detector.name();
                let detector = detector.clone();
                let page = page.clone();
                let ctx = ctx.clone();
                let permits = permits.clone();

                let handle = tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    detector.detect(&page, &ctx).await
                });
                handles.push((name, handle));
            }
            page_handles.push((page.url.clone(), handles));
        }

        let mut results = Vec::with_capacity(page_handles.len());
        for (page_url, handles) in page_handles {
            let mut by_detector = Vec::with_capacity(handles.len());
            for (name, handle) in handles {
                let findings = match handle.await {
                    Ok(Ok(findings)) => {
                        debug!("{} produced {} findings for {}", name, findings.len(), page_url);
                        findings
                            .into_iter()
                            .map(|f| f.with_detector(name))
                            .collect()
                    }
                    Ok(Err(e)) => {
                        warn!("Detector {} failed on {}: {}", name, page_url, e);
                        Vec::new()
                    }
                    Err(e) => {
                        warn!("Detector {} aborted on {}: {}", name, page_url, e);
                        Vec::new()
                    }
                };
                by_detector.push(DetectorFindings {
                    detector: name,
                    findings,
                });
            }
            results.push(PageFindings {
                page_url,
                by_detector,
            });
        }

        results
    }
}

impl Default for ProbeSet {
    fn default() -> Self {
        Self::standard()
    }
}
