use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mex_storage::{MemoryStore, MissionStore, PgStore};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mex-cli")]
#[command(about = "Mission explorer command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the explorer web UI.
    Serve,
    /// Print the merged global feed to stdout.
    Feed,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Connects to Postgres when `DATABASE_URL` is set; otherwise serves
/// from an empty in-memory store so the UI still comes up.
async fn store_from_env() -> Arc<dyn MissionStore> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => match PgStore::connect(&url).await {
            Ok(store) => Arc::new(store),
            Err(err) => {
                warn!(%err, "database connect failed, falling back to empty in-memory store");
                Arc::new(MemoryStore::new())
            }
        },
        Err(_) => {
            warn!("DATABASE_URL not set, serving from an empty in-memory store");
            Arc::new(MemoryStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let store = store_from_env().await;
            mex_web::serve_from_env(store).await?;
        }
        Commands::Feed => {
            let store = store_from_env().await;
            let missions = mex_feed::load_live_missions(store.as_ref()).await;
            for m in &missions {
                println!(
                    "{} [{}] {} ({})",
                    m.tanggal,
                    m.level_kode,
                    m.title,
                    m.source.as_str()
                );
            }
        }
    }

    Ok(())
}
