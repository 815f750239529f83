pub mod commands;
pub mod handlers;
pub mod report;

pub use commands::command_argument_builder;
pub use handlers::{
    extract_url_path, handle_scan, parse_fail_on, resolve_output_path, target_from_args,
    verbosity_filter,
};
pub use report::{ReportFormat, generate_json_report, generate_text_report, save_report};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn print_banner() {
    use colored::Colorize;
    println!(
        "{} {}",
        "webscan".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION").bright_white()
    );
    println!("{}", "crawl-and-probe web vulnerability scanner".dimmed());
    println!("{}", "For authorized security testing only.".yellow());
    println!();
}
