//! Social-Harvest main entry point
//!
//! This is the command-line interface for the incremental social-platform
//! harvester.

use anyhow::{Context, Result};
use clap::Parser;
use social_harvest::accounts::{distribute, ChainedCredentials, ConfigCredentials, EnvCredentials};
use social_harvest::config::{load_config_with_hash, Config};
use social_harvest::crawl::CrawlSettings;
use social_harvest::monitor::FileMonitor;
use social_harvest::output::{load_statistics, print_statistics};
use social_harvest::platform::{build_http_client, GatewayConnector};
use social_harvest::registry::{MergedRegistry, TargetRegistry};
use social_harvest::store::{open_store, SqliteStore};
use social_harvest::Orchestrator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Social-Harvest: an incremental social-platform harvester
///
/// Social-Harvest pulls profiles, posts, members and follow edges for a
/// monitored set of targets, shards them across credential slots and upserts
/// normalized documents with append-only metric snapshots.
#[derive(Parser, Debug)]
#[command(name = "social-harvest")]
#[command(version)]
#[command(about = "An incremental social-platform harvester", long_about = None)]
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

    /// Keep running, one tick every `interval` seconds, until Ctrl-C
    #[arg(long = "loop", conflicts_with_all = ["dry_run", "stats"])]
    run_loop: bool,

    /// Validate config and show the slot map without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Crawl only this slot, overriding `slots` in the config
    #[arg(long, value_name = "N")]
    slot: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(slot) = cli.slot {
        let range = config.job.slot_range();
        anyhow::ensure!(
            range.contains(&slot),
            "--slot {} is outside [{}, {})",
            slot,
            range.start,
            range.end
        );
        config.job.slots = Some(vec![slot]);
    }

    let store = Arc::new(
        open_store(Path::new(&config.store.database_path))
            .with_context(|| format!("failed to open {}", config.store.database_path))?,
    );

    if cli.dry_run {
        handle_dry_run(&config, store)
    } else if cli.stats {
        handle_stats(&config, &store)
    } else {
        handle_harvest(config, config_hash, store, cli.run_loop).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("social_harvest=info,warn"),
            1 => EnvFilter::new("social_harvest=debug,info"),
            2 => EnvFilter::new("social_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the job and the slot map
fn handle_dry_run(config: &Config, store: Arc<SqliteStore>) -> Result<()> {
    let job = &config.job;
    println!("=== Social-Harvest Dry Run ===\n");

    println!("Job:");
    println!("  Platform: {}", job.platform);
    println!("  Interval: {}s", job.interval);
    println!("  Period: {}s", job.period);
    match job.limit {
        Some(limit) => println!("  Limit: {} items per stream", limit),
        None => println!("  Limit: none"),
    }
    let kinds: Vec<_> = job.stream_kinds.iter().map(|k| k.as_str()).collect();
    println!("  Streams: {}", kinds.join(", "));
    println!(
        "  Slots: {} accounts from offset {}",
        job.num_accounts, job.slot_offset
    );

    println!("\nStore: {}", config.store.database_path);
    println!("Gateway: {}", config.gateway.base_url);
    if let Some(monitor) = &config.monitor {
        println!(
            "Heartbeat: {} -> {} (threshold {}s)",
            monitor.key,
            monitor.path,
            job.interval + monitor.grace
        );
    }

    let registry = MergedRegistry::from_config(&config.targets, store);
    let targets = registry.list_targets(job.platform)?;
    let slots = distribute(&targets, job.num_accounts, job.slot_offset);
    let settings = CrawlSettings::from_config(config, "");

    println!("\nTargets ({}):", targets.len());
    for (slot, slot_targets) in &slots {
        let owned = if settings.owns(*slot) { "" } else { " (not owned)" };
        println!("  {}{}: {} targets", slot, owned, slot_targets.len());
        for target in slot_targets {
            println!("    * {}", target);
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config, store: &SqliteStore) -> Result<()> {
    println!("Database: {}\n", config.store.database_path);

    let stats = load_statistics(store, store)?;
    print_statistics(&stats);

    Ok(())
}

/// Runs one tick, or the job loop with `--loop`
async fn handle_harvest(
    config: Config,
    config_hash: String,
    store: Arc<SqliteStore>,
    run_loop: bool,
) -> Result<()> {
    let base_url = Url::parse(&config.gateway.base_url)?;
    let client = build_http_client(Duration::from_secs(config.gateway.timeout))?;
    let connector = GatewayConnector::new(client, base_url, config.job.platform);

    let credentials = ChainedCredentials::new()
        .with(ConfigCredentials::from_accounts(&config.accounts))
        .with(EnvCredentials::new());

    let registry = MergedRegistry::from_config(&config.targets, store.clone());

    let settings = CrawlSettings::from_config(&config, &config_hash);
    let mut orchestrator = Orchestrator::new(
        settings,
        store.clone(),
        store,
        Arc::new(registry),
        Arc::new(connector),
        Arc::new(credentials),
    );
    if let Some(monitor) = &config.monitor {
        orchestrator = orchestrator.with_monitor(Arc::new(FileMonitor::new(PathBuf::from(
            &monitor.path,
        ))));
    }

    if !run_loop {
        let summary = orchestrator.run_tick().await?;
        tracing::info!(
            "Harvest complete: {}/{} targets, {} documents",
            summary.completed,
            summary.targets,
            summary.documents
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping after the current targets");
            let _ = shutdown_tx.send(true);
        }
    });

    orchestrator.run_forever(shutdown).await;
    Ok(())
}
