// Finding model shared by every detector and the aggregator

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Most severe first, for report stages that want a sorted view.
    pub fn all_descending() -> [Severity; 5] {
        [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::None,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Confidence {
    /// Observed directly, e.g. an alert fired in a real browser.
    Confirmed,
    /// A strong signature such as a database error string.
    Likely,
    /// A heuristic hint only.
    Possible,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Confirmed => "confirmed",
            Confidence::Likely => "likely",
            Confidence::Possible => "possible",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VulnKind {
    Xss,
    SqlInjection,
    AuthSession,
    AccessControl,
}

impl VulnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VulnKind::Xss => "xss",
            VulnKind::SqlInjection => "sql_injection",
            VulnKind::AuthSession => "auth_session",
            VulnKind::AccessControl => "access_control",
        }
    }

    /// Human-readable name for reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            VulnKind::Xss => "XSS",
            VulnKind::SqlInjection => "SQL Injection",
            VulnKind::AuthSession => "Auth / Session",
            VulnKind::AccessControl => "Access Control / IDOR",
        }
    }

    pub fn mitigation(&self) -> &'static str {
        match self {
            VulnKind::Xss => "Apply output encoding, input validation, and a Content Security Policy",
            VulnKind::SqlInjection => "Use parameterized queries; avoid dynamic SQL",
            VulnKind::AuthSession => {
                "Use Secure and HttpOnly cookies, enforce session expiry and regeneration after login"
            }
            VulnKind::AccessControl => {
                "Enforce server-side authorization; use indirect object references"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: VulnKind,
    pub endpoint: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub title: String,
    pub evidence: String,
    pub mitigation: String,
    pub payload: Option<String>,
    /// Name of the detector that produced the finding.
    pub detector: String,
}

impl Finding {
    pub fn new(
        kind: VulnKind,
        endpoint: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            severity,
            confidence: Confidence::Possible,
            title: title.into(),
            evidence: evidence.into(),
            mitigation: kind.mitigation().to_string(),
            payload: None,
            detector: String::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_detector(mut self, detector: &str) -> Self {
        self.detector = detector.to_string();
        self
    }
}
