use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// What went wrong on the wire for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchErrorKind {
    Connect,
    Dns,
    Timeout,
    Tls,
    RedirectLoop,
    Body,
    InvalidRequest,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchErrorKind::Connect => "connection failed",
            FetchErrorKind::Dns => "dns resolution failed",
            FetchErrorKind::Timeout => "timed out",
            FetchErrorKind::Tls => "tls error",
            FetchErrorKind::RedirectLoop => "too many redirects",
            FetchErrorKind::Body => "failed to read body",
            FetchErrorKind::InvalidRequest => "invalid request",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone)]
#[error("{kind} for {url}: {cause}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub cause: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            cause: cause.into(),
        }
    }

    /// Classify a reqwest failure. reqwest does not expose DNS and TLS failures as
    /// distinct variants, so those are recognised from the source chain.
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let cause = error_chain(err);
        let lowered = cause.to_lowercase();

        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else if err.is_redirect() {
            FetchErrorKind::RedirectLoop
        } else if err.is_builder() {
            FetchErrorKind::InvalidRequest
        } else if lowered.contains("dns")
            || lowered.contains("failed to lookup")
            || lowered.contains("name or service not known")
        {
            FetchErrorKind::Dns
        } else if lowered.contains("certificate")
            || lowered.contains("tls")
            || lowered.contains("ssl")
            || lowered.contains("handshake")
        {
            FetchErrorKind::Tls
        } else if err.is_body() || err.is_decode() {
            FetchErrorKind::Body
        } else {
            FetchErrorKind::Connect
        };

        Self::new(kind, url, cause)
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client setup failed: {0}")]
    ClientBuild(String),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display_includes_cause() {
        let err = FetchError::new(FetchErrorKind::Timeout, "http://a.test/", "deadline elapsed");
        let text = err.to_string();
        assert!(text.contains("timed out"));
        assert!(text.contains("http://a.test/"));
        assert!(text.contains("deadline elapsed"));
    }
}
