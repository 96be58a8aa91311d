use std::sync::Arc;

use clap::Parser;
use tether_core::TetherConfig;
use tether_store::{DurableStore, SqliteStore};
use tracing::info;

mod args;
mod commands;

use args::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tether=info,tether_cli=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // load config: --config > TETHER_CONFIG env > ~/.tether/tether.toml
    let mut config = TetherConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        TetherConfig::default()
    });
    if let Some(db) = cli.db {
        config.storage.path = db;
    }

    let store: Arc<dyn DurableStore> = Arc::new(SqliteStore::open(&config.storage.path)?);
    info!(path = %config.storage.path, "offline store ready");

    let ctx = commands::Context { config, store };
    match cli.command {
        Commands::Status { json } => commands::status(&ctx, json).await,
        Commands::Pending => commands::pending(&ctx).await,
        Commands::ClearCache => commands::clear_cache(&ctx).await,
        Commands::ClearQueue => commands::clear_queue(&ctx).await,
        Commands::Sync => commands::sync(&ctx).await,
        Commands::Refresh { query, limit } => commands::refresh(&ctx, query, limit).await,
        Commands::Watch => commands::watch(&ctx).await,
    }
}
