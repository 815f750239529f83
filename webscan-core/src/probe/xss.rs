use super::{Detector, ProbeContext, ProbeError, query_pairs, with_param_value};
use crate::finding::{Confidence, Finding, Severity, VulnKind};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;
use url::Url;
use webscan_scanner::fetch::FetchRequest;
use webscan_scanner::result::Page;

/// Passive cross-site scripting indicators, plus alert-payload confirmation when a
/// DOM renderer is available and, when enabled, verbatim reflection of injected
/// markup.
pub struct XssDetector;

#[async_trait]
impl Detector for XssDetector {
    fn name(&self) -> &'static str {
        "xss"
    }

    async fn detect(&self, page: &Page, ctx: &ProbeContext) -> Result<Vec<Finding>, ProbeError> {
        let mut findings = passive_findings(page);

        if ctx.target.tuning.active_xss {
            findings.extend(reflected_payloads(page, ctx).await);
        }

        if ctx.dom.is_some()
            && let Ok(url) = Url::parse(&page.url)
        {
            let payload = &ctx.target.tuning.xss_payload;
            let names: Vec<String> = query_pairs(&page.url).into_iter().map(|(k, _)| k).collect();

            for (index, name) in names.iter().enumerate() {
                let injected_url = with_param_value(&url, index, payload);
                let Some(rendered) = ctx.render(&injected_url).await else {
                    break;
                };
                match rendered {
                    Ok(rendered) if rendered.alert_triggered => {
                        findings.push(
                            Finding::new(
                                VulnKind::Xss,
                                &page.url,
                                Severity::Critical,
                                "Script execution confirmed",
                                format!("An alert fired after injecting into parameter '{}'", name),
                            )
                            .with_confidence(Confidence::Confirmed)
                            .with_payload(payload.clone()),
                        );
                    }
                    Ok(_) => {}
                    Err(e) => debug!("DOM render of {} failed: {}", injected_url, e),
                }
            }
        }

        if findings.is_empty() {
            findings.push(Finding::new(
                VulnKind::Xss,
                &page.url,
                Severity::None,
                "No passive indicators",
                "No inline script, event handlers, reflected parameter names or DOM sinks found",
            ));
        }

        Ok(findings)
    }
}

/// Inject each payload into each query parameter in turn and report payloads that
/// come back unencoded. One finding per parameter.
async fn reflected_payloads(page: &Page, ctx: &ProbeContext) -> Vec<Finding> {
    let Ok(url) = Url::parse(&page.url) else {
        return Vec::new();
    };
    let mut findings = Vec::new();

    for (index, (name, _)) in query_pairs(&page.url).into_iter().enumerate() {
        for payload in &ctx.target.tuning.xss_payloads {
            let injected_url = with_param_value(&url, index, payload);
            let response = match ctx.fetch(FetchRequest::get(injected_url.clone())).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("XSS payload request to {} failed: {}", injected_url, e);
                    continue;
                }
            };

            if response.body.contains(payload.as_str()) {
                findings.push(
                    Finding::new(
                        VulnKind::Xss,
                        &page.url,
                        Severity::High,
                        "Payload reflected unencoded",
                        format!(
                            "Markup injected into parameter '{}' came back verbatim",
                            name
                        ),
                    )
                    .with_confidence(Confidence::Likely)
                    .with_payload(payload.clone()),
                );
                break;
            }
        }
    }

    findings
}

fn passive_findings(page: &Page) -> Vec<Finding> {
    let mut findings = Vec::new();

    if page.signals.inline_script {
        findings.push(Finding::new(
            VulnKind::Xss,
            &page.url,
            Severity::Medium,
            "Inline script",
            "Page contains a <script> element without a src attribute",
        ));
    }

    for handler in &page.signals.event_handlers {
        findings.push(Finding::new(
            VulnKind::Xss,
            &page.url,
            Severity::High,
            "Event handler attribute",
            format!("<{}> carries a {} handler", handler.tag, handler.attribute),
        ));
    }

    let body = page.body.to_lowercase();
    let mut seen = HashSet::new();
    for (name, _) in query_pairs(&page.url) {
        let lowered = name.to_lowercase();
        if lowered.is_empty() || !seen.insert(lowered.clone()) {
            continue;
        }
        if body.contains(&lowered) {
            findings.push(Finding::new(
                VulnKind::Xss,
                &page.url,
                Severity::Medium,
                "Reflected parameter",
                format!("Query parameter name '{}' appears in the response body", name),
            ));
        }
    }

    for sink in &page.signals.dom_sinks {
        findings.push(Finding::new(
            VulnKind::Xss,
            &page.url,
            Severity::High,
            "DOM sink",
            format!("Response body contains '{}'", sink),
        ));
    }

    findings
}
