use crate::report::{self, ReportFormat};
use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;
use webscan_core::{
    ConfigError, FindingsReport, ProbeTuning, ScanSession, Severity, Target, TargetBuilder,
};
use webscan_scanner::ProgressCallback;

/// Log filter for `-v` repetitions. `RUST_LOG` takes precedence when set.
pub fn verbosity_filter(count: u8) -> &'static str {
    match count {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Expand `~` in an output path.
pub fn resolve_output_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

pub fn parse_fail_on(value: &str) -> Option<Severity> {
    match value.to_lowercase().as_str() {
        "critical" => Some(Severity::Critical),
        "high" => Some(Severity::High),
        "medium" => Some(Severity::Medium),
        "low" => Some(Severity::Low),
        _ => None,
    }
}

/// Extract the URL path for progress display
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path();
            if path.is_empty() { "/".to_string() } else { path.to_string() }
        })
        .unwrap_or_else(|| url.to_string())
}

/// Build a validated Target from `scan` arguments. Nothing touches the network here.
pub fn target_from_args(args: &ArgMatches) -> Result<Target, ConfigError> {
    let url = args
        .get_one::<Url>("url")
        .map(|u| u.as_str().to_string())
        .unwrap_or_default();

    let mut builder: TargetBuilder = Target::builder(url)
        .respect_robots(!args.get_flag("ignore-robots"))
        .tuning(ProbeTuning {
            active_sqli: args.get_flag("active-sqli"),
            active_xss: args.get_flag("active-xss"),
            ..ProbeTuning::default()
        });

    if let Some(patterns) = args.get_many::<String>("exclude") {
        builder = builder.crawl_exclusions(patterns.cloned());
    }

    if let Some(max_pages) = args.get_one::<usize>("max-pages") {
        builder = builder.max_pages(*max_pages);
    }
    if let Some(depth) = args.get_one::<usize>("max-depth") {
        builder = builder.max_depth(*depth);
    }
    if let Some(seconds) = args.get_one::<u64>("max-duration") {
        builder = builder.max_duration(Duration::from_secs(*seconds));
    }
    if let Some(workers) = args.get_one::<usize>("threads") {
        builder = builder.worker_count(*workers);
    }
    if let Some(delay) = args.get_one::<u64>("delay") {
        builder = builder.politeness_delay(Duration::from_millis(*delay));
    }
    if let Some(timeout) = args.get_one::<u64>("timeout") {
        builder = builder.request_timeout(Duration::from_secs(*timeout));
    }
    if let Some(agent) = args.get_one::<String>("user-agent") {
        builder = builder.user_agent(agent.clone());
    }

    if let Some(login_url) = args.get_one::<String>("login-url") {
        let username = args.get_one::<String>("username").cloned().unwrap_or_default();
        let password = args.get_one::<String>("password").cloned().ok_or_else(|| {
            ConfigError::InvalidCredentials(
                "--password or WEBSCAN_PASSWORD is required with --login-url".to_string(),
            )
        })?;
        builder = builder.credentials(login_url.clone(), username, password);
    }

    builder.build()
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_scan_header(target: &Target) {
    print_divider();
    println!("{}", "  WEBSCAN".bright_white().bold());
    print_divider();
    println!("{} Target: {}", "→".blue(), target.url.as_str().bright_white());
    println!(
        "{} Workers: {}  Max pages: {}  Delay: {}ms",
        "→".blue(),
        target.worker_count.to_string().cyan(),
        target.max_pages.to_string().cyan(),
        target.politeness_delay.as_millis().to_string().cyan()
    );
    if !target.respect_robots {
        println!("{} robots.txt is being ignored", "⚠".yellow().bold());
    }
    if target.credentials.is_some() {
        println!("{} Authenticated crawl", "→".blue());
    }
    println!();
}

fn print_summary(report: &FindingsReport) {
    println!(
        "{} Scanned {} pages ({} failed), {} findings",
        "✓".green().bold(),
        report.pages_scanned,
        report.pages_failed,
        report.findings.len()
    );
    for severity in Severity::all_descending() {
        let count = report.counts.get(severity);
        if count == 0 {
            continue;
        }
        let padded = format!("{:<10}", report::severity_label(severity));
        let label = match severity {
            Severity::Critical => padded.as_str().red().bold(),
            Severity::High => padded.as_str().red(),
            Severity::Medium => padded.as_str().yellow(),
            Severity::Low => padded.as_str().blue(),
            Severity::None => padded.as_str().normal(),
        };
        println!("  {} {}", label, count);
    }
    if report.deadline_hit {
        println!("{} Crawl hit its time limit; coverage is partial", "⚠".yellow().bold());
    }
    println!();
}

fn progress_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Run the `scan` subcommand. Returns the report so the caller can pick an exit status.
pub async fn handle_scan(args: &ArgMatches, quiet: bool) -> Result<FindingsReport> {
    let target = target_from_args(args).context("Invalid scan configuration")?;
    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let output = args.get_one::<String>("output").map(|p| resolve_output_path(p));
    // JSON on stdout stays machine-readable
    let quiet = quiet || (format == ReportFormat::Json && output.is_none());

    if !quiet {
        print_scan_header(&target);
    }

    let spinner = progress_spinner(quiet);
    spinner.set_message("Crawling...");
    let bar = spinner.clone();
    let progress_callback: ProgressCallback = Arc::new(move |worker_id: usize, url: String| {
        bar.set_message(format!("worker {}: {}", worker_id, extract_url_path(&url)));
    });

    let session = ScanSession::new(target)?.with_progress_callback(progress_callback);
    debug!("Scan id {}", session.scan_id());
    let result = session.run().await;
    spinner.finish_and_clear();
    let findings = result.context("Scan failed")?;

    if !quiet {
        print_summary(&findings);
    }

    let rendered = report::render(&findings, format).context("Failed to render report")?;
    match output {
        Some(path) => {
            report::save_report(&rendered, &path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !quiet {
                println!(
                    "{} Report saved to {}",
                    "✓".green().bold(),
                    path.display().to_string().bright_white()
                );
            }
        }
        None => print!("{}", rendered),
    }

    Ok(findings)
}
