//! fraudgate-daemon - anti-fraud eligibility gate service.
//!
//! Binds the validation HTTP API, opens the history store, and serves until
//! terminated. Configuration comes from a TOML file with CLI overrides;
//! absent file means defaults, absent overrides mean the file wins.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use fraudgate_core::config::GatekeeperConfig;
use fraudgate_daemon::gate::EligibilityGate;
use fraudgate_daemon::http::{router, AppState};
use fraudgate_daemon::store::SqliteHistoryStore;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// fraudgate eligibility gate daemon
#[derive(Parser, Debug)]
#[command(name = "fraudgate-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to gatekeeper configuration file
    #[arg(short, long, default_value = "gatekeeper.toml")]
    config: PathBuf,

    /// Listen address override
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// History database path override
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log filter (tracing `EnvFilter` syntax)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = if args.config.exists() {
        GatekeeperConfig::from_file(&args.config)
            .with_context(|| format!("failed to load config from {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "config file not found, using defaults");
        GatekeeperConfig::default()
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(db) = args.db {
        config.db_path = db;
    }

    let store = SqliteHistoryStore::open(&config.db_path)
        .with_context(|| format!("failed to open history store at {}", config.db_path.display()))?;
    let gate = EligibilityGate::new(store.clone(), config.clone());
    let app = router(AppState { gate, store });

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, db = %config.db_path.display(), "eligibility gate listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
