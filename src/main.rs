//! Sumi-Mirror main entry point
//!
//! This is the command-line interface for the Sumi-Mirror offline site mirror.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_mirror::config::{load_config_with_hash, validate, MirrorConfig};
use sumi_mirror::crawler::{Coordinator, ReqwestClient, SessionContext};
use sumi_mirror::output::{print_summary, write_markdown_report};
use sumi_mirror::MirrorError;
use tracing_subscriber::EnvFilter;

/// Sumi-Mirror: download a website for offline browsing
///
/// Fetches the seed page with its images, stylesheets and scripts, follows
/// same-domain links up to the given depth, and rewrites every mirrored page
/// to point at the local copies. Re-running over an existing mirror only
/// downloads what is missing.
#[derive(Parser, Debug)]
#[command(name = "sumi-mirror")]
#[command(version = "1.0.0")]
#[command(about = "Download a website for offline browsing", long_about = None)]
struct Cli {
    /// Site to mirror
    #[arg(value_name = "URL", env = "SITE_URL")]
    url: Option<String>,

    /// Directory the mirror is written to
    #[arg(value_name = "OUTPUT_DIR", env = "OUTPUT_DIR")]
    output_dir: Option<String>,

    /// How many link hops to follow from the seed page
    #[arg(value_name = "MAX_DEPTH", env = "MAX_DEPTH")]
    max_depth: Option<u32>,

    /// Cookies sent with every request (`key=value; key2=value2`)
    #[arg(long, env = "COOKIES")]
    cookies: Option<String>,

    /// Path to TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of parallel downloads
    #[arg(long, value_name = "N")]
    concurrency: Option<u32>,

    /// Write a markdown report of the run to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Validate the configuration and show what would be mirrored
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return Err(e);
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)
    } else {
        handle_mirror(config, cli.report.as_deref()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_mirror=info,warn"),
            1 => EnvFilter::new("sumi_mirror=debug,info"),
            2 => EnvFilter::new("sumi_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file (if any) and applies command-line overrides
fn build_config(cli: &Cli) -> Result<MirrorConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => MirrorConfig::default(),
    };

    if let Some(url) = &cli.url {
        config.site.seed_url = Some(url.clone());
    }
    if let Some(dir) = &cli.output_dir {
        config.site.output_dir = dir.clone();
    }
    if let Some(depth) = cli.max_depth {
        config.crawler.max_depth = depth;
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.max_concurrent_fetches = concurrency;
    }
    if let Some(cookies) = &cli.cookies {
        config.session.cookies = Some(cookies.clone());
    }

    validate(&config)?;

    if config.site.seed_url.is_none() {
        return Err(MirrorError::MissingSeed)
            .context("pass a URL argument, set SITE_URL, or set site.seed-url in the config file");
    }

    Ok(config)
}

/// Handles the --dry-run mode: shows what would be mirrored
fn handle_dry_run(config: &MirrorConfig) -> Result<()> {
    println!("=== Sumi-Mirror Dry Run ===\n");

    println!("Site:");
    println!("  Seed URL: {}", config.site.seed_url.as_deref().unwrap_or("-"));
    println!("  Output directory: {}", config.site.output_dir);

    println!("\nCrawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!(
        "  Max concurrent fetches: {}",
        config.crawler.max_concurrent_fetches
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);

    println!("\nSession:");
    println!("  User agent: {}", config.session.user_agent);
    println!(
        "  Cookies: {}",
        if config.session.cookies.is_some() { "set" } else { "none" }
    );
    for name in config.session.headers.keys() {
        println!("  Header: {}", name);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main mirror operation
async fn handle_mirror(config: MirrorConfig, report: Option<&std::path::Path>) -> Result<()> {
    let client = ReqwestClient::new(&config.crawler).context("failed to build HTTP client")?;
    let session = SessionContext::from_config(&config.session)?;
    let coordinator = Coordinator::new(&config, Arc::new(client), session)?;

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight downloads");
            cancel.cancel();
        }
    });

    let summary = match coordinator.run().await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Mirror failed: {}", e);
            return Err(e.into());
        }
    };

    print_summary(&summary);

    if let Some(path) = report {
        write_markdown_report(&summary, path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("\n✓ Report written to: {}", path.display());
    }

    Ok(())
}
