//! PlaySync - Session Server
//!
//! Accepts WebSocket connections, admits users against the account store,
//! and runs their listening sessions.
//!
//! Usage:
//!   playsync-server --domain sync.example.com
//!   playsync-server view            # List stored accounts

mod accounts;
mod cli;
mod routes;
mod socket;

use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use playsync_core::credentials::{CredentialStore, JsonFileStore};
use playsync_core::playback::{AppCredentials, SpotifyAuthorizer};
use playsync_core::{Hub, SyncConfig};
use tracing::{info, warn};

use crate::accounts::AccessKeys;
use crate::cli::{Cli, Command, LogLevel};
use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_level)?;

    let store = Arc::new(JsonFileStore::open(&cli.data_dir).await?);

    if cli.command == Some(Command::View) {
        return view(store.as_ref()).await;
    }

    let redirect_uri = cli.redirect_uri().ok_or("DOMAIN must be set")?;
    let credentials = AppCredentials {
        client_id: cli.spotify_id.clone().ok_or("SPOTIFY_ID must be set")?,
        client_secret: cli.spotify_secret.clone().ok_or("SPOTIFY_SECRET must be set")?,
        redirect_uri,
    };
    let authorizer = Arc::new(SpotifyAuthorizer::new(credentials)?);

    let keys = AccessKeys {
        server_key: cli.server_key.clone(),
        admin_key: cli.admin_key.clone(),
    };
    if keys.server_key.is_none() && keys.admin_key.is_none() {
        warn!("No SERVER_KEY or ADMIN_KEY set, account routes will reject every request");
    }

    let config = SyncConfig::default().with_sync_refresh(cli.sync_refresh());
    let hub = Hub::new(store.clone(), authorizer, config);
    let state = Arc::new(AppState {
        hub: hub.clone(),
        keys,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cli.port)).await?;
    info!(
        port = cli.port,
        accounts = %store.path().display(),
        refresh_secs = cli.sync_refresh().as_secs(),
        "Server listening"
    );

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    info!("Server stopped");
    Ok(())
}

fn init_logging(level: LogLevel) -> Result<(), Box<dyn Error>> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        tracing_subscriber::EnvFilter::new(level.as_str())
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            filter
                .add_directive("hyper=warn".parse()?)
                .add_directive("hyper_util=warn".parse()?)
                .add_directive("reqwest=warn".parse()?)
                .add_directive("tungstenite=warn".parse()?),
        )
        .init();
    Ok(())
}

/// Print every stored account
async fn view(store: &dyn CredentialStore) -> Result<(), Box<dyn Error>> {
    let entries = store.list().await?;
    if entries.is_empty() {
        println!("No accounts");
        return Ok(());
    }

    for entry in entries {
        let token = if entry.token.is_some() { "authorised" } else { "not authorised" };
        println!("{:<24} {}", entry.name, token);
    }
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, after every session and user is shut down
async fn shutdown_signal(hub: Arc<Hub>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down");
    hub.shutdown().await;
}
