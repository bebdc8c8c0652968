//! tcg-ingest main entry point
//!
//! This is the command-line interface for the trading-card catalog importer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tcg_ingest::config::{load_config_with_hash, Config};
use tcg_ingest::import::{discover_games, reset_set, start_import, sync_release_dates, BatchStatus};
use tcg_ingest::output::{load_statistics, print_batch_summary, print_report, print_statistics};
use tcg_ingest::storage::{open_storage, Storage};
use tcg_ingest::{Catalog, ImportOrchestrator};
use tracing_subscriber::EnvFilter;

/// tcg-ingest: resumable trading-card catalog importer
///
/// Imports sets, cards and prices of the configured catalogs from the upstream API
/// into a local SQLite database, resuming from the last checkpoint.
#[derive(Parser, Debug)]
#[command(name = "tcg-ingest")]
#[command(version = "1.0.0")]
#[command(about = "Resumable trading-card catalog importer", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Catalog to operate on (repeatable, defaults to every configured catalog)
    #[arg(short, long = "catalog", value_name = "CODE")]
    catalogs: Vec<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be imported without importing
    #[arg(long, group = "mode")]
    dry_run: bool,

    /// Show checkpoint and storage statistics and exit
    #[arg(long, group = "mode")]
    status: bool,

    /// Delete the stored cards of a set so the next import fetches it in full
    #[arg(long, value_name = "SET_CODE", group = "mode")]
    reset_set: Option<String>,

    /// Stop upstream metadata from overwriting a set
    #[arg(long, value_name = "SET_CODE", group = "mode")]
    freeze_set: Option<String>,

    /// Stop upstream metadata from overwriting an expansion
    #[arg(long, value_name = "TITLE", group = "mode")]
    freeze_expansion: Option<String>,

    /// List the games the upstream API serves and exit
    #[arg(long, group = "mode")]
    discover_games: bool,

    /// Copy upstream release dates onto stored sets and exit
    #[arg(long, group = "mode")]
    sync_release_dates: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let catalogs = selected_catalogs(&config, &cli.catalogs)?;

    if cli.dry_run {
        handle_dry_run(&config, &catalogs);
    } else if cli.status {
        handle_status(&config, &catalogs)?;
    } else if let Some(set_code) = &cli.reset_set {
        let catalog = single_catalog(&catalogs, "--reset-set")?;
        let mut storage = open_database(&config)?;
        let deleted = reset_set(&mut storage, &catalog.code, set_code)?;
        println!("Deleted {} cards from {}/{}", deleted, catalog.code, set_code);
    } else if let Some(set_code) = &cli.freeze_set {
        let catalog = single_catalog(&catalogs, "--freeze-set")?;
        let mut storage = open_database(&config)?;
        if !storage.freeze_set(&catalog.code, set_code)? {
            bail!("No set {} in catalog {}", set_code, catalog.code);
        }
        println!("Froze set {}/{}", catalog.code, set_code);
    } else if let Some(title) = &cli.freeze_expansion {
        let catalog = single_catalog(&catalogs, "--freeze-expansion")?;
        let mut storage = open_database(&config)?;
        if !storage.freeze_expansion(&catalog.code, title)? {
            bail!("No expansion {:?} in catalog {}", title, catalog.code);
        }
        println!("Froze expansion {:?} in {}", title, catalog.code);
    } else if cli.discover_games {
        handle_discover_games(&config, &config_hash).await?;
    } else if cli.sync_release_dates {
        handle_sync_release_dates(&config, &config_hash, &catalogs).await?;
    } else {
        handle_import(&config, &config_hash, catalogs).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tcg_ingest=info,warn"),
            1 => EnvFilter::new("tcg_ingest=debug,info"),
            2 => EnvFilter::new("tcg_ingest=trace,debug"),
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

/// Resolves `--catalog` codes against the configuration
fn selected_catalogs(config: &Config, codes: &[String]) -> Result<Vec<Catalog>> {
    if codes.is_empty() {
        return Ok(config.catalogs.iter().map(Catalog::from).collect());
    }

    codes
        .iter()
        .map(|code| {
            config
                .catalog(code)
                .map(Catalog::from)
                .with_context(|| format!("Catalog {} is not configured", code))
        })
        .collect()
}

fn single_catalog<'a>(catalogs: &'a [Catalog], flag: &str) -> Result<&'a Catalog> {
    match catalogs {
        [catalog] => Ok(catalog),
        _ => bail!("{} needs exactly one --catalog", flag),
    }
}

fn open_database(config: &Config) -> Result<tcg_ingest::storage::SqliteStorage> {
    open_storage(Path::new(&config.output.database_path))
        .with_context(|| format!("Failed to open database {}", config.output.database_path))
}

fn orchestrator(config: &Config, config_hash: &str) -> Result<ImportOrchestrator> {
    let storage = open_database(config)?;
    Ok(ImportOrchestrator::from_config(
        config,
        config_hash,
        Arc::new(Mutex::new(storage)),
    )?)
}

/// Handles the --dry-run mode: validates config and shows what would be imported
fn handle_dry_run(config: &Config, catalogs: &[Catalog]) {
    println!("=== tcg-ingest Dry Run ===\n");

    println!("API:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  Keys: {}", config.api.keys.len());
    println!("  Key cooldown: {}s", config.api.key_cooldown_secs);
    println!("  Request timeout: {}s", config.api.request_timeout_secs);

    println!("\nFetching:");
    println!("  Page size: {}", config.fetch.page_size);
    println!("  Inter-page delay: {}ms", config.fetch.inter_page_delay_ms);
    println!(
        "  Retry: {} attempts, {}ms base, {}ms cap",
        config.fetch.max_attempts, config.fetch.retry_base_delay_ms, config.fetch.retry_max_delay_ms
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nCatalogs ({}):", catalogs.len());
    for catalog in catalogs {
        println!(
            "  - {} ({}) game={} mode={:?}",
            catalog.code, catalog.display_name, catalog.game_id, catalog.mode
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --status mode: shows checkpoint and storage statistics
fn handle_status(config: &Config, catalogs: &[Catalog]) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);
    let storage = open_database(config)?;

    for catalog in catalogs {
        let stats = load_statistics(&storage, &catalog.code)?;
        print_statistics(&stats);
        println!();
    }

    Ok(())
}

async fn handle_discover_games(config: &Config, config_hash: &str) -> Result<()> {
    let orchestrator = orchestrator(config, config_hash)?;
    let games = discover_games(orchestrator.fetcher()).await?;

    println!("Games ({}):", games.len());
    for game in games {
        println!("  - {} {}", game.id, game.name.unwrap_or_default());
    }
    Ok(())
}

async fn handle_sync_release_dates(config: &Config, config_hash: &str, catalogs: &[Catalog]) -> Result<()> {
    let orchestrator = orchestrator(config, config_hash)?;

    for catalog in catalogs {
        let outcome = sync_release_dates(orchestrator.fetcher(), orchestrator.storage(), catalog).await?;
        println!("{}: {} release dates updated", catalog.code, outcome.updated);
        if outcome.pages_failed > 0 {
            println!("{}: {} set pages could not be fetched", catalog.code, outcome.pages_failed);
        }
    }
    Ok(())
}

/// Handles the main import operation
async fn handle_import(config: &Config, config_hash: &str, catalogs: Vec<Catalog>) -> Result<()> {
    tracing::info!(
        "Importing {} catalogs: {}",
        catalogs.len(),
        catalogs.iter().map(|c| c.code.as_str()).collect::<Vec<_>>().join(", ")
    );

    if let [catalog] = catalogs.as_slice() {
        let report = start_import(config, config_hash, &catalog.code).await?;
        print_report(&report);
        return Ok(());
    }

    let orchestrator = orchestrator(config, config_hash)?;
    let summary = orchestrator.import_catalogs(catalogs).await;
    print_batch_summary(&summary);

    match summary.overall_status() {
        BatchStatus::Failed => bail!("Every catalog import failed"),
        _ => Ok(()),
    }
}
