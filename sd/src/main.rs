//! sd - the sessiond daemon binary

use std::sync::Arc;

use clap::Parser;
use eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sessiond::cli::{Cli, Command};
use sessiond::{ChannelBroadcaster, Config, InMemoryStore, SessionManager, Store, llm};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("SD_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load(cli.config.as_ref())?;

    match cli.command {
        Command::Daemon => daemon(config).await,
        Command::Status => status(config).await,
        Command::Version => {
            println!("sessiond {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn daemon(config: Config) -> Result<()> {
    info!("sessiond daemon starting");

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let llm = llm::create_client(&config.llm)?;
    let broadcaster = Arc::new(ChannelBroadcaster::with_default_capacity());

    let manager = SessionManager::new(store, llm, broadcaster, config);
    let rehydrated = manager.load_active_sessions().await?;
    info!(rehydrated, "sessiond daemon ready");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, stopping sessions");
    for session in manager.list() {
        let _ = manager.stop(&session.id).await;
    }
    Ok(())
}

async fn status(config: Config) -> Result<()> {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let active = store.list_active_sessions().await?;
    let all = store.list_sessions().await?;
    println!("provider: {} ({})", config.llm.provider, config.llm.model);
    println!("sessions: {} total, {} active", all.len(), active.len());
    Ok(())
}
