mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use server::AppState;
use services::{AppServices, Clock};
use storage::Storage;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use config::{AppConfig, normalize_sqlite_url, prepare_sqlite_dir};

#[derive(Parser)]
#[command(name = "progress")]
#[command(about = "Roadmap learning progress server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "progress.toml")]
    config: PathBuf,

    /// SQLite url (overrides config file)
    #[arg(long, env = "PROGRESS_DB_URL")]
    db: Option<String>,

    /// Listen address (overrides config file)
    #[arg(long, env = "PROGRESS_BIND")]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create or upgrade the database schema and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;
    if let Some(db) = cli.db {
        config.database.url = db;
    }
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let db_url = normalize_sqlite_url(&config.database.url);
    prepare_sqlite_dir(&db_url)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => {
            let storage = Storage::sqlite(&db_url, config.database.max_connections)
                .await
                .with_context(|| format!("opening {db_url}"))?;
            drop(storage);
            tracing::info!(db_url = %db_url, "migrations applied");
            Ok(())
        }
        Command::Serve => serve(&config, &db_url).await,
    }
}

async fn serve(config: &AppConfig, db_url: &str) -> anyhow::Result<()> {
    let tokens = config.static_tokens()?;
    if tokens.is_empty() {
        tracing::warn!("no tokens configured, every request will be rejected");
    }
    let catalog = config.static_catalog()?;
    tracing::info!(entries = catalog.len(), "catalog loaded");

    let services = AppServices::new_sqlite(
        db_url,
        config.database.max_connections,
        Clock::default(),
        Arc::new(catalog),
    )
    .await
    .with_context(|| format!("opening {db_url}"))?;

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    let state = AppState::new(services, Arc::new(tokens));
    server::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
