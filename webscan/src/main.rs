use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use webscan::{command_argument_builder, handle_scan, parse_fail_on, print_banner, verbosity_filter};

fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_filter(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");
    init_tracing(chosen_command.get_count("verbose"));

    let json_to_stdout = matches!(
        chosen_command.subcommand(),
        Some(("scan", args))
            if args.get_one::<String>("format").map(String::as_str) == Some("json")
                && !args.contains_id("output")
    );

    // Show banner unless --quiet flag is set
    if !quiet && !json_to_stdout {
        print_banner();
    }

    match chosen_command.subcommand() {
        Some(("scan", primary_command)) => match handle_scan(primary_command, quiet).await {
            Ok(report) => {
                let threshold = primary_command
                    .get_one::<String>("fail-on")
                    .and_then(|s| parse_fail_on(s));
                match threshold {
                    Some(severity) if report.has_findings_at_or_above(severity) => ExitCode::from(2),
                    _ => ExitCode::SUCCESS,
                }
            }
            Err(e) => {
                eprintln!("✗ {:#}", e);
                ExitCode::FAILURE
            }
        },
        // No subcommand provided, just show the banner
        None => ExitCode::SUCCESS,
        _ => unreachable!("clap should ensure we don't get here"),
    }
}
