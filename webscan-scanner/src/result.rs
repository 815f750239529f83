use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response headers with lower-cased names. Multi-valued headers such as
/// `set-cookie` keep one entry per value in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeaders(Vec<(String, String)>);

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.push((name.to_ascii_lowercase(), value.into()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = ResponseHeaders::new();
        for (k, v) in iter {
            headers.insert(k.as_ref(), v);
        }
        headers
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub name: Option<String>,
    pub input_type: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    /// Absolute action URL.
    pub action: String,
    /// `get` or `post`, lower-cased.
    pub method: String,
    pub inputs: Vec<Input>,
}

impl Form {
    pub fn has_password_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|i| i.input_type.eq_ignore_ascii_case("password"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventHandler {
    pub tag: String,
    pub attribute: String,
}

/// Cheap client-side indicators pulled out while parsing. The DOM-sink list is a
/// substring search over the raw body, so it also matches text that is not script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSignals {
    pub inline_script: bool,
    pub event_handlers: Vec<EventHandler>,
    pub dom_sinks: Vec<String>,
}

/// Everything the parser extracts from one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFacts {
    pub links: Vec<String>,
    pub forms: Vec<Form>,
    pub signals: PageSignals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageOutcome {
    Parsed,
    FetchFailed(String),
}

/// One fetched URL. Built once by the crawler and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub url: String,
    pub depth: usize,
    pub status_code: u16,
    pub headers: ResponseHeaders,
    pub content_type: Option<String>,
    pub body_length: usize,
    pub body: String,
    pub response_time: Duration,
    pub has_html: bool,
    pub forms: Vec<Form>,
    /// Same-origin links only.
    pub links: Vec<String>,
    pub signals: PageSignals,
    pub outcome: PageOutcome,
}

impl Page {
    pub fn new(url: String, depth: usize) -> Self {
        Self {
            url,
            depth,
            status_code: 0,
            headers: ResponseHeaders::new(),
            content_type: None,
            body_length: 0,
            body: String::new(),
            response_time: Duration::from_secs(0),
            has_html: false,
            forms: Vec::new(),
            links: Vec::new(),
            signals: PageSignals::default(),
            outcome: PageOutcome::Parsed,
        }
    }

    pub fn with_error(url: String, depth: usize, error: String) -> Self {
        Self {
            outcome: PageOutcome::FetchFailed(error),
            ..Self::new(url, depth)
        }
    }

    pub fn is_fetch_failed(&self) -> bool {
        matches!(self.outcome, PageOutcome::FetchFailed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            PageOutcome::FetchFailed(cause) => Some(cause),
            PageOutcome::Parsed => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    Duplicate,
    OverLimit,
    Depth,
    /// Matched a crawl exclusion such as `logout`.
    Excluded,
    /// Redirected to another origin.
    OffOrigin,
}

/// Lifecycle of a URL inside one crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlState {
    Queued,
    Fetching,
    Parsed,
    FetchFailed,
    Disallowed,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlOutcome {
    pub url: String,
    pub depth: usize,
    pub state: CrawlState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlStats {
    pub fetched: usize,
    pub failed: usize,
    pub disallowed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlReport {
    /// Pages in crawl-completion order.
    pub pages: Vec<Page>,
    pub outcomes: Vec<UrlOutcome>,
    pub stats: CrawlStats,
    pub deadline_hit: bool,
}
