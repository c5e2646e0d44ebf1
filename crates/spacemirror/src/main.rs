use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use spacemirror_core::client::{ConfluenceClient, ConfluenceClientConfig};
use spacemirror_core::config::{
    ConfigOverrides, DEFAULT_CONFIG_FILENAME, ExportConfig, load_config,
};
use spacemirror_core::export::{ExportReport, export_spaces};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "spacemirror",
    version,
    about = "Mirror Confluence spaces into a static HTML site"
)]
struct Cli {
    #[arg(
        long,
        value_name = "PATH",
        help = "TOML config file (default: ./spacemirror.toml when present)"
    )]
    config: Option<PathBuf>,
    #[arg(long, value_name = "DIR", help = "Output directory (default: docs)")]
    out_dir: Option<PathBuf>,
    #[arg(long, value_name = "TEXT", help = "Title of the generated index page")]
    site_title: Option<String>,
    #[arg(
        long,
        value_name = "KEYS",
        value_delimiter = ',',
        help = "Comma-separated space keys (overrides CONFLUENCE_SPACES)"
    )]
    spaces: Option<Vec<String>>,
    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase logging verbosity")]
    verbose: u8,
    #[arg(short, long, conflicts_with = "verbose", help = "Only log errors")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    setup_logging(cli.verbose, cli.quiet);

    let config = resolve_config(&cli)?;
    tracing::debug!(?config, "resolved configuration");
    let mut client = ConfluenceClient::new(ConfluenceClientConfig::from_export_config(&config))?;
    let report = export_spaces(&config, &mut client)?;
    print_summary(&report);
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<ExportConfig> {
    let file = match &cli.config {
        Some(path) => load_config(path, true)?,
        None => load_config(Path::new(DEFAULT_CONFIG_FILENAME), false)?,
    };
    let overrides = ConfigOverrides {
        out_dir: cli.out_dir.clone(),
        site_title: cli.site_title.clone(),
        spaces: cli.spaces.clone(),
    };
    ExportConfig::resolve(&file, &overrides)
}

fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose == 0 {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("spacemirror_core=info,warn"))
    } else if verbose == 1 {
        EnvFilter::new("spacemirror_core=debug,info")
    } else {
        EnvFilter::new("trace")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_summary(report: &ExportReport) {
    if !report.warnings.is_empty() {
        println!("warnings:");
        for warning in &report.warnings {
            println!("  - {warning}");
        }
    }
    println!("requests: {}", report.request_count);
    for line in summary_lines(report) {
        println!("{line}");
    }
}

/// Per-space lines followed by the grand total, always last.
fn summary_lines(report: &ExportReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.spaces.len() + 1);
    for space in &report.spaces {
        let mut notes = Vec::new();
        if space.fetched_bodies > 0 {
            notes.push(format!("{} bodies fetched by id", space.fetched_bodies));
        }
        if space.skipped > 0 {
            notes.push(format!("{} skipped", space.skipped));
        }
        if notes.is_empty() {
            lines.push(format!("{}: {} pages", space.space, space.written));
        } else {
            lines.push(format!(
                "{}: {} pages ({})",
                space.space,
                space.written,
                notes.join(", ")
            ));
        }
    }
    lines.push(format!(
        "Total: {} pages written to {}",
        report.total_written,
        normalize_path(&report.out_dir)
    ));
    lines
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
