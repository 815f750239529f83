use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("webscan")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("webscan")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .arg(
            arg!(-v --"verbose" ...)
                .help("Increase log verbosity (-v info, -vv debug). RUST_LOG overrides this.")
                .required(false),
        )
        .subcommand_required(false)
        .subcommand(
            command!("scan")
                .about(
                    "Crawl a site from a seed URL and probe every page for XSS, SQL injection, \
                session and access-control weaknesses.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The seed URL to crawl")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-p --"max-pages" <NUM>)
                        .required(false)
                        .help("Stop after this many pages")
                        .env("WEBSCAN_MAX_PAGES")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("200"),
                )
                .arg(
                    arg!(-d --"max-depth" <DEPTH>)
                        .required(false)
                        .help("Do not follow links more than this many hops from the seed")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"max-duration" <SECONDS>)
                        .required(false)
                        .help("Stop crawling after this many seconds and probe what was collected")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("The number of async workers for crawling and probing")
                        .env("WEBSCAN_WORKERS")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"delay" <MILLISECONDS>)
                        .required(false)
                        .help("Minimum delay between requests to the same origin")
                        .env("WEBSCAN_DELAY_MS")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("500"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .env("WEBSCAN_TIMEOUT_SECS")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(-A --"user-agent" <AGENT>)
                        .required(false)
                        .help("User-Agent sent with every request and matched against robots.txt")
                        .env("WEBSCAN_USER_AGENT"),
                )
                .arg(
                    arg!(--"ignore-robots")
                        .required(false)
                        .help("Crawl paths disallowed by robots.txt")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"exclude" <PATTERN>)
                        .required(false)
                        .help("Never follow links whose path contains PATTERN; replaces the default logout,signout,logoff")
                        .value_delimiter(',')
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"login-url" <URL>)
                        .required(false)
                        .help("Page holding the login form; enables authenticated crawling")
                        .requires("username"),
                )
                .arg(
                    arg!(--"username" <USERNAME>)
                        .required(false)
                        .help("Username for the login form")
                        .requires("login-url"),
                )
                .arg(
                    arg!(--"password" <PASSWORD>)
                        .required(false)
                        .help("Password for the login form")
                        .env("WEBSCAN_PASSWORD")
                        .hide_env_values(true),
                )
                .arg(
                    arg!(--"active-sqli")
                        .required(false)
                        .help("Re-request query parameters with SQL payloads (sends extra requests)")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"active-xss")
                        .required(false)
                        .help("Re-request query parameters with XSS payloads and check for verbatim reflection")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"fail-on" <SEVERITY>)
                        .required(false)
                        .help("Exit with status 2 when a finding at or above this severity is reported")
                        .value_parser(["critical", "high", "medium", "low"]),
                ),
        )
}
