//! Sumi-Mirror main entry point
//!
//! This is the command-line interface for the Sumi-Mirror static site mirror.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use sumi_mirror::config::{load_config_with_hash, validate, Config, OutputMode};
use sumi_mirror::crawler::mirror;
use sumi_mirror::output::print_summary;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configured basic-auth password
const PASSWORD_ENV: &str = "SUMI_MIRROR_PASSWORD";

/// Sumi-Mirror: an incremental static mirror of a content-managed site
///
/// Sumi-Mirror crawls the site from its entry routes, rewrites internal
/// links for serving or offline browsing, reuses cached resources that did
/// not change, and atomically publishes the new generation.
#[derive(Parser, Debug)]
#[command(name = "sumi-mirror")]
#[command(version)]
#[command(about = "An incremental static mirror of a content-managed site", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Abort on the first route failure and exit non-zero
    #[arg(long)]
    strict: bool,

    /// Rewrite links as file:// URLs for browsing straight from disk
    #[arg(long)]
    offline_use: bool,

    /// Start the crawl from this site path (e.g. "/en/")
    #[arg(long, value_name = "PATH")]
    root: Option<String>,

    /// Validate config and show the effective settings without mirroring
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    apply_overrides(&mut config, &cli);
    validate(&config).context("command line overrides")?;

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let summary = mirror(config).await.context("mirror run failed")?;
    if !cli.quiet {
        print_summary(&summary);
    }

    if summary.has_failures() {
        tracing::warn!(
            "{} routes failed and are missing from the mirror",
            summary.failures.len()
        );
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
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

/// Applies command line flags and the password environment variable
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if cli.strict {
        config.crawler.strict = true;
    }
    if cli.offline_use {
        config.output.mode = OutputMode::Offline;
    }
    if let Some(root) = &cli.root {
        let root = if root.ends_with('/') {
            root.clone()
        } else {
            format!("{}/", root)
        };
        config.crawler.entry_routes = vec![root.clone(), format!("{}404.html", root)];
    }
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        tracing::debug!("Using the password from {}", PASSWORD_ENV);
        config.site.password = Some(password);
    }
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Mirror Dry Run ===\n");

    println!("Site:");
    println!("  Origin: {}", config.site.origin);
    println!("  Hostnames: {}", config.site.hostnames.join(", "));
    println!(
        "  Authoring host: {} (published as {})",
        config.site.authoring_hostname, config.site.public_hostname
    );
    println!(
        "  Authentication: {}",
        match &config.site.username {
            Some(user) => format!("basic, as {}", user),
            None => "none".to_string(),
        }
    );

    println!("\nCrawler:");
    println!("  Entry routes: {}", config.crawler.entry_routes.join(", "));
    println!("  Workers: {}", config.crawler.workers);
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);
    println!(
        "  Timeout: {}s, retries: {} (backoff {}ms)",
        config.crawler.timeout_secs, config.crawler.max_retries, config.crawler.retry_backoff_ms
    );
    println!("  Strict: {}", config.crawler.strict);

    println!("\nOutput:");
    println!("  Root: {}", config.output.root);
    println!("  Mode: {:?}", config.output.mode);

    println!("\nIndex Sources ({}):", config.index.collections.len());
    for collection in &config.index.collections {
        println!("  - {}{}", config.site.origin.trim_end_matches('/'), collection);
    }
    if let Some(events) = &config.index.events_origin {
        println!(
            "  - {}/v2/events (as {}/<id>)",
            events.trim_end_matches('/'),
            config.index.events_prefix
        );
    }

    println!("\n✓ Configuration is valid");
}
