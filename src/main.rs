//! Tile Cache - maintenance CLI
//!
//! Inspects and edits a cache database from the command line.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_cache::{CacheConfig, CacheItem, SqliteCache};

/// Inspect and maintain a tile cache database.
#[derive(Parser, Debug)]
#[command(name = "tile-cache", version, about)]
struct Cli {
    /// Persistent storage area (the database lives in `<DATA_DIR>/cache/`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Database file name
    #[arg(long, global = true)]
    db_name: Option<String>,

    /// Maximum number of records kept after a prune
    #[arg(long, global = true)]
    max_size: Option<u32>,

    /// Log every executed SQL statement (needs RUST_LOG=tile_cache::sql=trace)
    #[arg(long, global = true)]
    trace_sql: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print cache statistics as JSON
    Stats,
    /// Print an item's metadata, optionally writing its payload to a file
    Get {
        key: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Store a file's contents under a key
    Put {
        key: String,
        file: PathBuf,
        #[arg(long)]
        replace: bool,
    },
    /// Remove a key
    Delete { key: String },
    /// Evict the oldest records down to the maximum size
    Prune,
    /// Delete the database file
    Clear,
    /// Delete and recreate an empty database
    Reinit,
}

fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tile_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = CacheConfig::from_env();
    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir);
    }
    if let Some(db_name) = cli.db_name {
        config = config.with_db_name(db_name);
    }
    if let Some(max_size) = cli.max_size {
        config = config.with_max_cache_size(max_size);
    }

    let cache = SqliteCache::open(config).context("failed to open cache")?;
    if cli.trace_sql {
        cache.enable_sql_trace();
    }

    match cli.command {
        Command::Stats => {
            let stats = cache.stats();
            let report = json!({
                "path": cache.path(),
                "max_cache_size": cache.max_cache_size(),
                "hit_rate": stats.hit_rate(),
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Get { key, out } => match cache.get_item(&key) {
            Some(item) => {
                if let Some(out) = out {
                    fs::write(&out, &item.data)
                        .with_context(|| format!("failed to write {}", out.display()))?;
                }
                let report = json!({
                    "key": key,
                    "size": item.data.len(),
                    "added_at": item.added_at,
                    "last_modified": item.last_modified,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            None => anyhow::bail!("key not found: {key}"),
        },
        Command::Put { key, file, replace } => {
            let data =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let size = data.len();
            cache.add(&key, CacheItem::new(data), replace)?;
            info!(key = %key, size, "stored");
        }
        Command::Delete { key } => {
            cache.delete(&key)?;
            info!(key = %key, "deleted");
        }
        Command::Prune => {
            let removed = cache.prune()?;
            println!("{}", json!({ "removed": removed }));
        }
        Command::Clear => {
            cache.clear()?;
        }
        Command::Reinit => {
            cache.reinit()?;
        }
    }

    cache.close()?;
    Ok(())
}
