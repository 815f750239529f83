use crate::finding::{Finding, Severity};
use crate::probe::PageFindings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use webscan_scanner::result::Page;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub none: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::None => self.none += 1,
        }
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::None => self.none,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.none
    }
}

/// Everything a scan produced, in discovery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingsReport {
    pub scan_id: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_scanned: usize,
    pub pages_failed: usize,
    pub findings: Vec<Finding>,
    pub counts: SeverityCounts,
    /// The crawl stopped at its deadline; findings cover only the pages fetched by then.
    #[serde(default)]
    pub deadline_hit: bool,
}

impl FindingsReport {
    pub fn has_findings_at_or_above(&self, severity: Severity) -> bool {
        self.findings.iter().any(|f| f.severity >= severity)
    }
}

pub struct Aggregator {
    scan_id: String,
    target: String,
    started_at: DateTime<Utc>,
}

impl Aggregator {
    pub fn new(scan_id: impl Into<String>, target: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            scan_id: scan_id.into(),
            target: target.into(),
            started_at,
        }
    }

    /// Concatenate detector output without reordering or deduplicating it.
    pub fn aggregate(&self, pages: &[Arc<Page>], results: Vec<PageFindings>) -> FindingsReport {
        let mut findings = Vec::new();
        let mut counts = SeverityCounts::default();

        for page_findings in results {
            for detector_findings in page_findings.by_detector {
                for finding in detector_findings.findings {
                    counts.add(finding.severity);
                    findings.push(finding);
                }
            }
        }

        let pages_failed = pages.iter().filter(|p| p.is_fetch_failed()).count();

        FindingsReport {
            scan_id: self.scan_id.clone(),
            target: self.target.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            pages_scanned: pages.len() - pages_failed,
            pages_failed,
            findings,
            counts,
            deadline_hit: false,
        }
    }
}
