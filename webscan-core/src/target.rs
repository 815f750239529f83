use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use webscan_scanner::fetch::DEFAULT_USER_AGENT;

pub use webscan_scanner::crawler::{
    DEFAULT_CRAWL_EXCLUSIONS, DEFAULT_MAX_PAGES, DEFAULT_POLITENESS_DELAY,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WORKERS: usize = 6;
pub const WORKERS_ENV: &str = "WEBSCAN_WORKERS";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Target URL is required")]
    MissingUrl,

    #[error("Invalid target URL '{0}': {1}")]
    InvalidUrl(String, String),

    #[error("Unsupported scheme '{0}', expected http or https")]
    UnsupportedScheme(String),

    #[error("Target URL has no host")]
    MissingHost,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Login details for authenticated crawling.
#[derive(Clone)]
pub struct Credentials {
    pub login_url: Url,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login_url", &self.login_url.as_str())
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Detector thresholds. These are heuristics, so they are configuration rather than
/// hard-coded constants.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTuning {
    /// A mutated IDOR response below this similarity to the baseline is suspicious.
    pub idor_similarity_threshold: f64,
    /// Field label counted in IDOR responses; more occurrences than the baseline is suspicious.
    pub idor_marker: String,
    pub idor_mutations: Vec<String>,
    /// Re-request query parameters with SQL payloads. Off by default.
    pub active_sqli: bool,
    pub sqli_payloads: Vec<String>,
    /// Record label counted before and after a payload; more records means the
    /// payload changed the query's result set.
    pub sqli_marker: String,
    /// Submitted through the DOM renderer when one is configured.
    pub xss_payload: String,
    /// Re-request query parameters with `xss_payloads` and look for them verbatim in
    /// the response. Off by default.
    pub active_xss: bool,
    pub xss_payloads: Vec<String>,
}

impl Default for ProbeTuning {
    fn default() -> Self {
        Self {
            idor_similarity_threshold: 0.7,
            idor_marker: "first name".to_string(),
            idor_mutations: ["1", "2", "3", "999999"].map(String::from).to_vec(),
            active_sqli: false,
            sqli_payloads: [
                "'",
                "' OR '1'='1",
                "' OR '1'='1' #",
                "' UNION SELECT null, version() #",
            ]
            .map(String::from)
            .to_vec(),
            sqli_marker: "first name:".to_string(),
            xss_payload: "<script>alert('webscan')</script>".to_string(),
            active_xss: false,
            xss_payloads: [
                "<script>alert('XSS')</script>",
                "<img src=x onerror=alert(1)>",
                "<h1>XSS_TEST</h1>",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// Immutable description of one scan.
#[derive(Debug, Clone)]
pub struct Target {
    pub url: Url,
    pub max_pages: usize,
    pub max_depth: Option<usize>,
    pub max_duration: Option<Duration>,
    pub politeness_delay: Duration,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub worker_count: usize,
    pub respect_robots: bool,
    /// Lowercase substrings; links whose path or query contains one are not crawled.
    pub crawl_exclusions: Vec<String>,
    pub credentials: Option<Credentials>,
    pub tuning: ProbeTuning,
}

impl Target {
    pub fn builder(url: impl Into<String>) -> TargetBuilder {
        TargetBuilder::new(url)
    }
}

/// Worker count from `WEBSCAN_WORKERS`, falling back to the default when unset or invalid.
pub fn default_worker_count() -> usize {
    worker_count_from(std::env::var(WORKERS_ENV).ok().as_deref())
}

pub fn worker_count_from(value: Option<&str>) -> usize {
    value
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_WORKERS)
}

#[derive(Debug, Clone)]
pub struct TargetBuilder {
    url: String,
    max_pages: usize,
    max_depth: Option<usize>,
    max_duration: Option<Duration>,
    politeness_delay: Duration,
    user_agent: String,
    request_timeout: Duration,
    worker_count: Option<usize>,
    respect_robots: bool,
    crawl_exclusions: Vec<String>,
    credentials: Option<(String, String, String)>,
    tuning: ProbeTuning,
}

impl TargetBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_pages: DEFAULT_MAX_PAGES,
            max_depth: None,
            max_duration: None,
            politeness_delay: DEFAULT_POLITENESS_DELAY,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            worker_count: None,
            respect_robots: true,
            crawl_exclusions: DEFAULT_CRAWL_EXCLUSIONS.iter().map(|p| p.to_string()).collect(),
            credentials: None,
            tuning: ProbeTuning::default(),
        }
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    pub fn politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn worker_count(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    pub fn respect_robots(mut self, respect: bool) -> Self {
        self.respect_robots = respect;
        self
    }

    /// Replaces the default `logout`, `signout` and `logoff` exclusions.
    pub fn crawl_exclusions<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.crawl_exclusions = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn credentials(
        mut self,
        login_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((login_url.into(), username.into(), password.into()));
        self
    }

    pub fn tuning(mut self, tuning: ProbeTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn build(self) -> Result<Target, ConfigError> {
        let url = parse_http_url(&self.url)?;

        if self.max_pages == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_pages",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "user_agent",
                reason: "must not be empty".to_string(),
            });
        }
        if self.worker_count == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "worker_count",
                reason: "must be at least 1".to_string(),
            });
        }
        let threshold = self.tuning.idor_similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                field: "idor_similarity_threshold",
                reason: format!("{} is outside 0.0..=1.0", threshold),
            });
        }

        let crawl_exclusions: Vec<String> = self
            .crawl_exclusions
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        let credentials = match self.credentials {
            Some((login_url, username, password)) => {
                if username.is_empty() {
                    return Err(ConfigError::InvalidCredentials(
                        "username is empty".to_string(),
                    ));
                }
                let login_url = parse_http_url(&login_url).map_err(|e| {
                    ConfigError::InvalidCredentials(format!("login URL: {}", e))
                })?;
                Some(Credentials {
                    login_url,
                    username,
                    password,
                })
            }
            None => None,
        };

        Ok(Target {
            url,
            max_pages: self.max_pages,
            max_depth: self.max_depth,
            max_duration: self.max_duration,
            politeness_delay: self.politeness_delay,
            user_agent: self.user_agent,
            request_timeout: self.request_timeout,
            worker_count: self.worker_count.unwrap_or_else(default_worker_count),
            respect_robots: self.respect_robots,
            crawl_exclusions,
            credentials,
            tuning: self.tuning,
        })
    }
}

fn parse_http_url(raw: &str) -> Result<Url, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::MissingUrl);
    }

    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(raw.to_string(), e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::MissingHost);
    }
    Ok(url)
}
