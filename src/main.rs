//! Skimmer command-line entry point.

use anyhow::Context;
use clap::Parser;
use skimmer::config::{load_config_with_hash, Config};
use skimmer::Engine;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Skimmer: a polite, adaptive web crawler
///
/// Skimmer expands outward from seed URLs within configurable bounds,
/// honouring robots.txt and per-host pacing, deduplicating content and
/// persisting extracted pages.
#[derive(Parser, Debug)]
#[command(name = "skimmer")]
#[command(version)]
#[command(about = "A polite, adaptive web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Additional seed URLs, appended to the config's seeds
    #[arg(short, long, value_name = "URL")]
    seed: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate the config and show what would be crawled, then exit
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    config.seeds.extend(cli.seed);

    if cli.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    run_crawl(config).await
}

/// Sets up the tracing subscriber based on verbosity level.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("skimmer=info,warn"),
            1 => EnvFilter::new("skimmer=debug,info"),
            2 => EnvFilter::new("skimmer=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Prints the effective configuration without crawling.
fn print_dry_run(config: &Config) {
    println!("=== Skimmer Dry Run ===\n");

    println!("Crawl bounds:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Workers: {}", config.crawler.workers);
    println!("  Strategy: {:?}", config.crawler.strategy);
    println!("  Render mode: {:?}", config.crawler.render_mode);

    println!("\nPoliteness:");
    println!("  Delay: {}ms - {}ms (adaptive: {})",
        config.politeness.min_delay_ms,
        config.politeness.max_delay_ms,
        config.politeness.adaptive_delay,
    );
    println!("  Respect robots.txt: {}", config.politeness.respect_robots);
    println!("  Page timeout: {}s", config.politeness.page_timeout_secs);

    println!("\nUser agent: {}", config.user_agent.user_agent);

    println!("\nOutput:");
    if !config.output.jsonl_path.is_empty() {
        println!("  JSONL: {}", config.output.jsonl_path);
    }
    if !config.output.database_path.is_empty() {
        println!("  Database: {}", config.output.database_path);
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Runs the crawl with Ctrl-C wired to a graceful shutdown.
async fn run_crawl(config: Config) -> anyhow::Result<()> {
    let engine = Engine::new(config)?;

    let handle = engine.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            handle.shutdown();
        }
    });

    let stats = engine.run().await?;

    println!("\n=== Crawl Summary ===");
    println!("  Added:      {}", stats.added);
    println!("  Crawled:    {}", stats.crawled);
    println!("  Stored:     {}", stats.stored);
    println!("  Duplicates: {}", stats.duplicates);
    println!("  Failed:     {}", stats.failed);
    println!("  Skipped:    {}", stats.skipped);
    println!("  Hosts:      {}", stats.hosts_seen);
    println!("  Duration:   {:.1}s", stats.duration.as_secs_f64());

    Ok(())
}
