pub mod crawler;
pub mod error;
pub mod fetch;
pub mod frontier;
pub mod parser;
pub mod politeness;
pub mod result;
pub mod robots;
pub mod scope;

pub use crawler::{Crawler, ProgressCallback};
pub use error::{FetchError, FetchErrorKind, ScanError};
pub use fetch::{FetchRequest, Fetcher, FetcherConfig, HttpFetcher, Method, Response};
pub use parser::PageParser;
pub use politeness::PolitenessLimiter;
pub use result::{CrawlReport, CrawlState, Form, Input, Page, PageFacts, PageSignals};
pub use robots::RobotsGate;
pub use scope::Scope;
