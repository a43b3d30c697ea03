//! pairgate binary.
//!
//! Runs the pairing HTTP server with the simulated protocol client.
//! Real deployments swap in a transport implementing
//! [`pairgate::wa::WaClientFactory`].

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pairgate::config::Config;
use pairgate::http::{AppState, PairingServer, PairingServerConfig, router};
use pairgate::pairing::PairingOrchestrator;
use pairgate::session::SessionStore;
use pairgate::wa::SimulatedClientFactory;
use pairgate::{Error, PairingCodeCache};

#[derive(Debug, Parser)]
#[command(name = "pairgate", about = "WhatsApp pairing-code gateway", version)]
struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, env = "PAIRGATE_BIND")]
    bind: Option<SocketAddr>,

    /// Root directory for session credential directories.
    #[arg(long, env = "PAIRGATE_SESSION_ROOT")]
    session_root: Option<PathBuf>,

    /// Simulate a successful link this many seconds after a session opens.
    #[arg(long)]
    simulate_link_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(root) = cli.session_root {
        config.session_root = root;
    }

    let mut factory = SimulatedClientFactory::new();
    if let Some(secs) = cli.simulate_link_secs {
        factory = factory.link_after(Duration::from_secs(secs));
    }

    let cache = Arc::new(PairingCodeCache::new().with_ttl(config.code_ttl));
    let store = SessionStore::new(&config.session_root);
    let orchestrator = Arc::new(PairingOrchestrator::new(
        cache,
        store,
        Arc::new(factory),
        &config,
    ));

    let sweeper = orchestrator.spawn_sweeper(config.sweep_interval);

    let mut server = PairingServer::new(PairingServerConfig {
        addr: config.bind_addr,
    });
    server.start(router(AppState { orchestrator })).await?;

    tokio::signal::ctrl_c().await.map_err(|e| {
        pairgate::error::ServerError::StartupFailed {
            reason: format!("Failed to install signal handler: {e}"),
        }
    })?;

    tracing::info!("Shutdown requested");
    sweeper.abort();
    server.shutdown().await;
    Ok(())
}
