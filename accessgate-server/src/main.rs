//! Quota server binary.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p accessgate-server --release
//!
//! # Run with custom config path
//! accessgate-server --config /path/to/config.toml
//!
//! # Configure logging level
//! RUST_LOG=debug accessgate-server
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` - Override bind address (default: `0.0.0.0`)
//! - `PORT` - Override port (default: `4022`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! A `.env` file in the working directory is loaded first.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use accessgate::amount::format_units;
use accessgate::subscription::SubscriptionStore;
use accessgate::timestamp::UnixTimestamp;
use axum::http::Method;
use clap::Parser;
use tokio::task::JoinHandle;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use accessgate_server::config::{Cli, ServerConfig};
use accessgate_server::{AppState, SharedState, router};

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load_from(&cli.config)?;
    let state: SharedState = Arc::new(AppState::from_config(&config)?);
    tracing::info!(
        host = %config.host,
        port = config.port,
        ledger = %config.ledger.address,
        token = %config.token.address,
        chain_id = config.token.chain_id,
        price = %format_units(state.price(), config.decimals()),
        resources = ?config.resources,
        "Loaded configuration"
    );

    let purge = spawn_purge(state.store().clone(), config.purge_interval());

    let app = router(Arc::clone(&state))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Quota server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge.abort();
    let ledger = state.ledger().await;
    tracing::info!(
        subscriptions = state.store().len(),
        balance = %format_units(ledger.balance(), config.decimals()),
        "Quota server shut down gracefully"
    );
    Ok(())
}

/// Sweeps expired subscriptions every `every`.
fn spawn_purge(store: SubscriptionStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = store.purge_expired(UnixTimestamp::now());
            if removed > 0 {
                tracing::info!(removed, "Purged expired subscriptions");
            }
        }
    })
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
        () = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
