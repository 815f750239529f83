use super::similarity::marker_count;
use super::{Detector, ProbeContext, ProbeError, query_pairs, with_param_value};
use crate::finding::{Confidence, Finding, Severity, VulnKind};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;
use webscan_scanner::fetch::FetchRequest;
use webscan_scanner::result::Page;

struct ErrorSignature {
    vendor: &'static str,
    patterns: Vec<Regex>,
}

fn signature(vendor: &'static str, patterns: &[&str]) -> ErrorSignature {
    ErrorSignature {
        vendor,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(p).expect("static SQL error pattern"))
            .collect(),
    }
}

static SQL_ERROR_SIGNATURES: Lazy<Vec<ErrorSignature>> = Lazy::new(|| {
    vec![
        signature(
            "MySQL",
            &[
                r"(?i)you have an error in your sql syntax",
                r"(?i)warning:.*\bmysqli?_",
                r"(?i)MySqlException",
            ],
        ),
        signature(
            "MSSQL",
            &[
                r"(?i)unclosed quotation mark after the character string",
                r"(?i)microsoft ole db provider for sql server",
                r"SQLSTATE\[\w+\]",
            ],
        ),
        signature("Oracle", &[r"\bORA-\d{5}\b", r"(?i)quoted string not properly terminated"]),
        signature(
            "PostgreSQL",
            &[
                r"PG::SyntaxError",
                r"(?i)syntax error at or near",
                r"(?i)pg_query\(\)",
            ],
        ),
        signature("Generic", &[r"(?i)sql syntax", r"(?i)unterminated quoted string"]),
    ]
});

/// Vendors whose error signature appears in `body`, in table order.
pub fn matched_vendors(body: &str) -> Vec<&'static str> {
    SQL_ERROR_SIGNATURES
        .iter()
        .filter(|sig| sig.patterns.iter().any(|p| p.is_match(body)))
        .map(|sig| sig.vendor)
        .collect()
}

/// SQL error signatures in the response body, reflected parameter values, and
/// optionally a re-request of each parameter with quote payloads.
///
/// A payload counts when it brings up an error signature the page did not already
/// show, or when the response lists more records than the page did (the tautology
/// payloads widen a `WHERE` clause).
pub struct SqlInjectionDetector;

#[async_trait]
impl Detector for SqlInjectionDetector {
    fn name(&self) -> &'static str {
        "sqli"
    }

    async fn detect(&self, page: &Page, ctx: &ProbeContext) -> Result<Vec<Finding>, ProbeError> {
        let mut findings = passive_findings(page);

        if ctx.target.tuning.active_sqli {
            findings.extend(self.active_findings(page, ctx).await);
        }

        Ok(findings)
    }
}

impl SqlInjectionDetector {
    async fn active_findings(&self, page: &Page, ctx: &ProbeContext) -> Vec<Finding> {
        let Ok(url) = Url::parse(&page.url) else {
            return Vec::new();
        };
        let tuning = &ctx.target.tuning;
        let baseline = matched_vendors(&page.body);
        let baseline_records = marker_count(&page.body, &tuning.sqli_marker);
        let mut findings = Vec::new();

        for (index, (name, value)) in query_pairs(&page.url).into_iter().enumerate() {
            for payload in &tuning.sqli_payloads {
                let injected_url = with_param_value(&url, index, &format!("{}{}", value, payload));
                let request = FetchRequest::get(injected_url.clone());

                let response = match ctx.fetch(request).await {
                    Ok(response) => response,
                    Err(e) => {
                        debug!("SQL payload request to {} failed: {}", injected_url, e);
                        continue;
                    }
                };

                let new_vendor = matched_vendors(&response.body)
                    .into_iter()
                    .find(|v| !baseline.contains(v));
                let records = marker_count(&response.body, &tuning.sqli_marker);

                let finding = if let Some(vendor) = new_vendor {
                    Finding::new(
                        VulnKind::SqlInjection,
                        &page.url,
                        Severity::High,
                        "SQL error triggered by payload",
                        format!(
                            "{} error signature appeared after injecting into parameter '{}'",
                            vendor, name
                        ),
                    )
                } else if records > baseline_records {
                    Finding::new(
                        VulnKind::SqlInjection,
                        &page.url,
                        Severity::High,
                        "Payload changed the result set",
                        format!(
                            "Injecting into parameter '{}' raised the '{}' count from {} to {}",
                            name, tuning.sqli_marker, baseline_records, records
                        ),
                    )
                } else {
                    continue;
                };

                findings.push(
                    finding
                        .with_confidence(Confidence::Likely)
                        .with_payload(payload.clone()),
                );
                // one confirmed payload per parameter is enough
                break;
            }
        }

        findings
    }
}

fn passive_findings(page: &Page) -> Vec<Finding> {
    let mut findings = Vec::new();

    for vendor in matched_vendors(&page.body) {
        findings.push(
            Finding::new(
                VulnKind::SqlInjection,
                &page.url,
                Severity::High,
                "SQL error message",
                format!("Response body matches a {} SQL error signature", vendor),
            )
            .with_confidence(Confidence::Likely),
        );
    }

    for (name, value) in query_pairs(&page.url) {
        if !value.is_empty() && page.body.contains(&value) {
            findings.push(
                Finding::new(
                    VulnKind::SqlInjection,
                    &page.url,
                    Severity::Low,
                    "Reflected parameter value",
                    format!(
                        "Value of parameter '{}' is reflected in the response; reflection alone does not prove injection",
                        name
                    ),
                )
                .with_confidence(Confidence::Possible),
            );
        }
    }

    findings
}
