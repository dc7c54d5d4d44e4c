//! Seed the identity cache from a legacy export
//!
//! **Usage:**
//! ```bash
//! load-existing [--config <file>] [--dry-run] <export.json>
//! ```
//!
//! Entries whose bruid is already cached are skipped; the rest are inserted
//! in one transaction.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use rabdap_common::config::{resolve_config_path, ServiceConfig};
use rabdap_common::{time, IdField};
use rabdap_id::db::seed::read_seed_file;
use rabdap_id::db::{self, CacheStore, SqliteCacheStore};
use tracing::{info, warn};

/// Identity cache seed loader
#[derive(Parser, Debug)]
#[clap(name = "load-existing")]
#[clap(about = "Import a legacy identity export into the cache")]
struct Args {
    /// Export file (JSON object of {brown_id, short_id, email} records)
    #[clap(value_name = "FILE")]
    input: PathBuf,

    /// Config file (TOML); only the database section is used
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Parse and report without writing
    #[clap(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let config = ServiceConfig::load_or_default(resolve_config_path(args.config.as_deref()).as_deref())
        .context("Failed to load configuration")?;

    let entries = read_seed_file(&args.input, time::now())
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    info!("Parsed {} unique records from {}", entries.len(), args.input.display());

    let pool = db::init_database_pool(&config.database.path)
        .await
        .context("Failed to open database")?;
    let store = SqliteCacheStore::new(pool);

    let mut fresh = Vec::with_capacity(entries.len());
    for entry in entries {
        if store.find_one(IdField::Bruid, &entry.bruid).await?.is_some() {
            warn!(bruid = %entry.bruid, "Already cached, skipping");
            continue;
        }
        fresh.push(entry);
    }

    if args.dry_run {
        info!("Dry run: {} entries would be inserted", fresh.len());
        return Ok(());
    }

    let inserted = store
        .insert_many(&fresh)
        .await
        .context("Seed import failed, nothing was written")?;
    info!(
        "Inserted {} entries into {} ({} total)",
        inserted,
        config.database.path.display(),
        store.count().await?
    );

    Ok(())
}
