//! assetindex CLI — inspect the materialized registry view.
//!
//! Usage:
//! ```bash
//! assetindex status  --db registry.db
//! assetindex summary --db registry.db
//! assetindex owner 0xDE4c5b756E3c19CD0c39C67a94967A2D77C4C6eC --db registry.db
//! assetindex info
//! ```

use std::env;
use std::process;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use assetindex_core::error::IndexerError;
use assetindex_core::types::EventOrigin;
use assetindex_storage::sqlite::SqliteStore;
use assetindex_storage::QueryService;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let db = flag_value(&args, "--db").unwrap_or_else(|| "registry.db".to_string());

    let result = match args[1].as_str() {
        "status" => cmd_status(&db).await,
        "summary" => cmd_summary(&db).await,
        "owner" => match args.get(2).filter(|a| !a.starts_with("--")) {
            Some(address) => cmd_owner(&db, address).await,
            None => {
                eprintln!("Usage: assetindex owner <ADDRESS> [--db PATH]");
                process::exit(1);
            }
        },
        "info" => {
            cmd_info();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            println!("assetindex {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn print_cursor(cursor: Option<EventOrigin>) {
    match cursor {
        Some(c) => println!("Cursor:    block {}, log {}", c.block_number, c.log_index),
        None => println!("Cursor:    (no events applied yet)"),
    }
}

async fn open(db: &str) -> Result<QueryService<SqliteStore>, IndexerError> {
    Ok(QueryService::new(Arc::new(SqliteStore::open(db).await?)))
}

async fn cmd_status(db: &str) -> Result<(), IndexerError> {
    let service = open(db).await?;
    let summary = service.summary().await?;

    print_cursor(summary.cursor);
    println!("Assets:    {}", summary.data.total_assets);
    println!("Transfers: {}", summary.data.total_transfers);
    Ok(())
}

async fn cmd_summary(db: &str) -> Result<(), IndexerError> {
    let service = open(db).await?;
    let summary = service.summary().await?;

    print_cursor(summary.cursor);
    println!("Assets:    {}", summary.data.total_assets);
    println!("Transfers: {}", summary.data.total_transfers);

    println!("\nTop owners:");
    if summary.data.top_owners.is_empty() {
        println!("  (none)");
    }
    for holding in &summary.data.top_owners {
        println!("  {:>4}  {}", holding.count, holding.owner);
    }

    println!("\nActivity by day:");
    if summary.data.activity_by_day.is_empty() {
        println!("  (none)");
    }
    for day in &summary.data.activity_by_day {
        println!("  {}  {}", day.day, day.count);
    }
    Ok(())
}

async fn cmd_owner(db: &str, address: &str) -> Result<(), IndexerError> {
    let service = open(db).await?;
    let assets = service.assets_by_owner(address).await?;

    print_cursor(assets.cursor);
    if assets.data.is_empty() {
        println!("No assets held by {address}");
        return Ok(());
    }
    for asset in &assets.data {
        println!("  #{:<6} {}", asset.id, asset.description);
    }
    Ok(())
}

fn print_usage() {
    println!("assetindex {}", env!("CARGO_PKG_VERSION"));
    println!("Materialized view of on-chain asset registrations and transfers\n");
    println!("USAGE:");
    println!("    assetindex <COMMAND> [--db PATH]\n");
    println!("COMMANDS:");
    println!("    status   Show ingestion cursor and row counts");
    println!("    summary  Totals, top owners, and activity by day");
    println!("    owner    List assets held by an address");
    println!("    info     Show AssetIndex configuration info");
    println!("    version  Print version");
    println!("    help     Print this help");
}

fn cmd_info() {
    println!("AssetIndex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default chunk size: 1000 blocks/fetch");
    println!("  Default apply retry budget: 3 (transfers ahead of their registration)");
    println!("  Storage backends: memory, SQLite (feature: sqlite)");
    println!("  Events: AssetRegistered, OwnershipTransferred");
}
