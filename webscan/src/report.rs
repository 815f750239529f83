// Text and JSON rendering of a FindingsReport

use std::fs::File;
use std::io::Write;
use std::path::Path;
use webscan_core::{Finding, FindingsReport, Severity};

const HEAVY_RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const LIGHT_RULE: &str = "────────────────────────────────────────────────────────────────────────────────";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }
}

pub fn render(report: &FindingsReport, format: ReportFormat) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(report)),
        ReportFormat::Json => generate_json_report(report),
    }
}

/// Most severe first. The sort is stable, so discovery order holds within a severity.
pub fn sorted_by_severity(findings: &[Finding]) -> Vec<&Finding> {
    let mut sorted: Vec<&Finding> = findings.iter().collect();
    sorted.sort_by(|a, b| b.severity.cmp(&a.severity));
    sorted
}

fn section(report: &mut String, title: &str) {
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str(title);
    report.push('\n');
    report.push_str(HEAVY_RULE);
    report.push_str("\n\n");
}

pub fn generate_text_report(data: &FindingsReport) -> String {
    let mut report = String::new();

    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("                        WEBSCAN VULNERABILITY SCAN REPORT\n");
    report.push_str(HEAVY_RULE);
    report.push_str("\n\n");

    report.push_str(&format!("Scan ID:      {}\n", data.scan_id));
    report.push_str(&format!("Target:       {}\n", data.target));
    report.push_str(&format!(
        "Scan Date:    {}\n",
        data.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    report.push_str(&format!("Duration:     {} seconds\n", duration_seconds(data)));
    report.push_str(&format!("Pages:        {} scanned, {} failed\n", data.pages_scanned, data.pages_failed));
    if data.deadline_hit {
        report.push_str("Note:         crawl stopped at its time limit; coverage is partial\n");
    }
    report.push('\n');

    section(&mut report, "EXECUTIVE SUMMARY");
    report.push_str(&format!("Total Findings: {}\n\n", data.counts.total()));

    for severity in Severity::all_descending() {
        let count = data.counts.get(severity);
        if count > 0 {
            report.push_str(&format!(
                "  {:<11}{}  ({})\n",
                format!("[{}]", severity_label(severity)),
                count,
                severity_hint(severity)
            ));
        }
    }
    report.push('\n');

    if !data.findings.is_empty() {
        section(&mut report, "DETAILED FINDINGS");

        for (idx, finding) in sorted_by_severity(&data.findings).into_iter().enumerate() {
            report.push_str(&format!("[{}] {}\n", idx + 1, finding.title));
            report.push_str(&format!("Severity:     {}\n", severity_label(finding.severity)));
            report.push_str(&format!("Confidence:   {}\n", finding.confidence.as_str()));
            report.push_str(&format!("Type:         {}\n", finding.kind.display_name()));
            report.push_str(&format!("URL:          {}\n", finding.endpoint));
            if let Some(ref payload) = finding.payload {
                report.push_str(&format!("Payload:      {}\n", payload));
            }
            if !finding.detector.is_empty() {
                report.push_str(&format!("Detector:     {}\n", finding.detector));
            }

            report.push_str("\nEvidence:\n");
            report.push_str(&wrap_text(&finding.evidence, 80, "  "));
            report.push_str("\nRemediation:\n");
            report.push_str(&wrap_text(&finding.mitigation, 80, "  "));
            report.push('\n');

            report.push_str(LIGHT_RULE);
            report.push_str("\n\n");
        }
    }

    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("                          End of Report\n");
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("\nGenerated by webscan - a crawl-and-probe web vulnerability scanner\n");
    report.push_str("For authorized security testing only.\n\n");

    report
}

pub fn generate_json_report(data: &FindingsReport) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "webscan",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json",
                "disclaimer": "For authorized security testing only"
            },
            "scan": {
                "id": data.scan_id,
                "target": data.target,
                "start_time": data.started_at.to_rfc3339(),
                "end_time": data.finished_at.to_rfc3339(),
                "duration_seconds": duration_seconds(data),
                "deadline_hit": data.deadline_hit
            },
            "summary": {
                "pages_scanned": data.pages_scanned,
                "pages_failed": data.pages_failed,
                "total_findings": data.counts.total(),
                "severity_breakdown": data.counts
            },
            "findings": data.findings
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn duration_seconds(data: &FindingsReport) -> i64 {
    (data.finished_at - data.started_at).num_seconds()
}

pub fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "CRITICAL",
        Severity::High => "HIGH",
        Severity::Medium => "MEDIUM",
        Severity::Low => "LOW",
        Severity::None => "INFO",
    }
}

fn severity_hint(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "Immediate action required",
        Severity::High => "High priority",
        Severity::Medium => "Should be addressed",
        Severity::Low => "Minor issues",
        Severity::None => "Informational",
    }
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.len() + word.len() + 1 > width - indent.len() && !current_line.is_empty() {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line.clear();
        }

        if !current_line.is_empty() {
            current_line.push(' ');
        }
        current_line.push_str(word);
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
        result.push('\n');
    }

    result
}
