//! # parley-server
//!
//! Real-time chat gateway.
//!
//! This binary provides:
//! - **WebSocket gateway** at `/ws`: bearer-authenticated sockets exchanging
//!   JSON `{event, data}` frames for messaging, history, contacts and presence
//! - **Connection registry** holding at most one live socket per user, with a
//!   configurable duplicate-connection policy
//! - **Presence tracking** persisted to the user rows
//! - **REST API** (axum) for health checks and conversation lookup

mod api;
mod auth;
mod config;
mod error;
mod gateway;
mod history;
mod presence;
mod registry;
mod resolver;
mod router;
mod socket;

#[cfg(test)]
mod testutil;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use parley_store::{Database, SharedDatabase};

use crate::api::AppState;
use crate::auth::SignedTokenVerifier;
use crate::config::ServerConfig;
use crate::gateway::Gateway;
use crate::registry::ConnectionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley gateway v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        instance = %config.instance_name,
        http_addr = %config.http_addr,
        policy = ?config.duplicate_policy,
        "Loaded configuration"
    );
    if config.token_key_is_default() {
        warn!("TOKEN_PUBKEY not set, every connection will be refused");
    }

    // -----------------------------------------------------------------------
    // 3. Open storage
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    if let Some(path) = db.path() {
        info!(path = %path.display(), "Storage ready");
    }

    // Nobody is connected to a process that just started.
    let stale = db.reset_presence(chrono::Utc::now())?;
    if stale > 0 {
        info!(count = stale, "Cleared stale online flags");
    }

    let db = SharedDatabase::new(db);

    // -----------------------------------------------------------------------
    // 4. Initialize the gateway
    // -----------------------------------------------------------------------
    let registry = Arc::new(ConnectionRegistry::new(config.duplicate_policy));
    let gateway = Arc::new(Gateway::new(db, registry));
    let verifier = Arc::new(SignedTokenVerifier::new(config.token_pubkey));

    let http_addr = config.http_addr;
    let app_state = AppState {
        gateway,
        verifier,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 5. Run the HTTP + WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
