use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;

use stocksync::catalog::{CoefficientSource, Db, PgCatalogStore};
use stocksync::feed::fetch::FeedFetcher;
use stocksync::housekeeping;
use stocksync::model::ImportMode;
use stocksync::orchestrator::{Orchestrator, RunOptions, RunOutcome};
use stocksync::suppliers::descriptor::FeedDescriptor;
use stocksync::suppliers::registry::SupplierRegistry;
use stocksync::suppliers::SupplierKey;
use stocksync::sync::{sync_products, RateLimiter, SyncClient};
use stocksync::util::env as env_util;

#[derive(Parser, Debug)]
#[command(name = "stocksync", version, about = "Supplier feed reconciliation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    // Allow `stocksync --only deltyre` without the explicit `run` subcommand.
    // If a subcommand is present, these args are ignored.
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import one or more supplier feeds (default when no command supplied)
    Run(RunArgs),
    /// Push specific products downstream without importing anything
    Sync(SyncArgs),
    /// List suppliers with their identities and feed layouts
    Suppliers,
    /// List the markup coefficient table
    Coefficients,
    /// Check configuration without running anything
    Preflight,
    /// Delete expired spool archives
    Cleanup(CleanupArgs),
    /// Apply pending schema migrations and exit
    Migrate,
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    /// Restrict the run to these suppliers (comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    only: Vec<SupplierKey>,
    /// Skip these suppliers (comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    skip: Vec<SupplierKey>,
    /// Cap the number of rows taken from each feed
    #[arg(long)]
    limit: Option<usize>,
    /// Bulk mode: wider chunks and a longer time budget
    #[arg(long, action = ArgAction::SetTrue)]
    bulk: bool,
    /// Leave the downstream API alone at the end of the run
    #[arg(long = "no-sync", action = ArgAction::SetTrue)]
    no_sync: bool,
    /// Pause between suppliers (overrides IMPORT_SUPPLIER_SLEEP_SECS)
    #[arg(long)]
    sleep_secs: Option<u64>,
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Product ids to push (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    ids: Vec<i64>,
}

#[derive(Debug, Args)]
struct CleanupArgs {
    /// Retention in days (overrides CLEANUP_RETENTION_DAYS)
    #[arg(long)]
    days: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    stocksync::tracing::init_tracing("info,sqlx=warn")?;
    let cli = Cli::parse();
    match cli.command {
        Some(Command::Run(args)) => run(args).await,
        None => run(cli.run).await,
        Some(Command::Sync(args)) => sync(args).await,
        Some(Command::Suppliers) => {
            suppliers();
            Ok(())
        }
        Some(Command::Coefficients) => coefficients().await,
        Some(Command::Preflight) => preflight(),
        Some(Command::Cleanup(args)) => cleanup(args),
        Some(Command::Migrate) => migrate().await,
    }
}

fn select_suppliers(only: &[SupplierKey], skip: &[SupplierKey]) -> Vec<SupplierKey> {
    SupplierKey::ALL
        .iter()
        .copied()
        .filter(|key| only.is_empty() || only.contains(key))
        .filter(|key| !skip.contains(key))
        .collect()
}

async fn run(args: RunArgs) -> Result<()> {
    let keys = select_suppliers(&args.only, &args.skip);
    if keys.is_empty() {
        bail!("no suppliers selected");
    }

    let mode = if args.bulk {
        ImportMode::Bulk
    } else {
        ImportMode::Interactive
    };
    let mut options = RunOptions::from_env(mode);
    options.row_limit = args.limit;
    options.sync_enabled = !args.no_sync;
    if let Some(secs) = args.sleep_secs {
        options.sleep_between = Duration::from_secs(secs);
    }

    let db = Db::connect(&env_util::db_url()?).await?;
    let store = PgCatalogStore::new(db);
    let transport = if options.sync_enabled {
        SyncClient::from_env()
            .context("downstream sync is configured via SYNC_API_URL; pass --no-sync to run without it")?
    } else {
        // placeholder client, never called with sync disabled
        SyncClient::new("http://sync.invalid")?
    };
    let orchestrator = Orchestrator::new(
        &store,
        &transport,
        SupplierRegistry::from_env(),
        FeedFetcher::from_env()?,
        RateLimiter::from_env(),
    );

    let summary = orchestrator.run_all(&keys, &options).await?;

    println!("run {}", summary.run_id);
    for report in &summary.reports {
        let detail = match &report.outcome {
            RunOutcome::Completed { stats, stopped } => match stopped {
                Some(stop) => format!("{stats} (stopped early: {stop})"),
                None => stats.to_string(),
            },
            RunOutcome::Skipped { reason } => reason.clone(),
            RunOutcome::Failed { error } => error.clone(),
        };
        println!(
            "  {:<14} {:<8} {:>7}ms  {detail}",
            report.key.name(),
            report.outcome.status_label(),
            report.duration.as_millis(),
        );
    }
    println!("  totals: {}", summary.totals());
    match &summary.sync {
        Some(sync) => println!("  sync: {sync}"),
        None if options.sync_enabled => println!("  sync: nothing to push"),
        None => println!("  sync: disabled"),
    }
    Ok(())
}

async fn sync(args: SyncArgs) -> Result<()> {
    let db = Db::connect(&env_util::db_url()?).await?;
    let store = PgCatalogStore::new(db);
    let transport = SyncClient::from_env()?;
    let registry = SupplierRegistry::from_env();
    let limiter = RateLimiter::from_env();

    let stats = sync_products(&store, &transport, &registry, &limiter, &args.ids).await;
    println!("sync: {stats}");
    Ok(())
}

fn suppliers() {
    let registry = SupplierRegistry::from_env();
    for key in SupplierKey::ALL {
        let descriptor = FeedDescriptor::for_supplier(key);
        match registry.identity(key) {
            Some(identity) => println!(
                "{:<14} id={:<3} uid={:<5} {}",
                identity.name,
                identity.id,
                identity.external_uid,
                descriptor.summary()
            ),
            None => println!("{:<14} (unregistered)  {}", key.name(), descriptor.summary()),
        }
    }
}

async fn coefficients() -> Result<()> {
    let db = Db::connect(&env_util::db_url()?).await?;
    let store = PgCatalogStore::new(db);
    let rows = store.list_all().await?;
    if rows.is_empty() {
        println!("no coefficients configured, the default multiplier 1.0 applies everywhere");
        return Ok(());
    }
    for c in &rows {
        println!(
            "{:<14} type={:<12} brand={:<12} x{}",
            c.supplier,
            c.product_type.as_deref().unwrap_or("*"),
            c.brand.as_deref().unwrap_or("*"),
            c.multiplier
        );
    }
    Ok(())
}

fn preflight() -> Result<()> {
    let mut also_log: Vec<String> = [
        "SYNC_API_URL",
        "SYNC_API_KEY",
        "SYNC_BATCH_SIZE",
        "SYNC_CALLS_PER_MINUTE",
        "SYNC_MIN_DELAY_MS",
        "FEED_SPOOL_DIR",
        "IMPORT_CHUNK_SIZE",
        "IMPORT_SUPPLIER_SLEEP_SECS",
        "IMPORT_MEMORY_LIMIT_MB",
        "CLEANUP_RETENTION_DAYS",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    for key in SupplierKey::ALL {
        let prefix = key.env_prefix();
        also_log.push(format!("{prefix}_FEED_URL"));
        also_log.push(format!("{prefix}_FEED_FILE"));
    }
    let also_refs: Vec<&str> = also_log.iter().map(String::as_str).collect();
    env_util::preflight_check("stocksync", &["DATABASE_URL"], &also_refs)?;
    println!("preflight ok");
    Ok(())
}

fn cleanup(args: CleanupArgs) -> Result<()> {
    let retention = match args.days {
        Some(days) => Duration::from_secs(days * 86_400),
        None => housekeeping::retention_from_env(),
    };
    let dir = PathBuf::from(
        env_util::env_opt("FEED_SPOOL_DIR").unwrap_or_else(|| "./spool".to_string()),
    );
    let stats = housekeeping::cleanup_spool(&dir, retention)?;
    println!("cleanup: {stats}");
    Ok(())
}

async fn migrate() -> Result<()> {
    // connect() applies anything pending
    let db = Db::connect(&env_util::db_url()?).await?;
    drop(db);
    info!("migrations applied");
    println!("migrations applied");
    Ok(())
}
