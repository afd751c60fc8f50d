//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the gateway starts with zero configuration
//! for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use parley_shared::constants::{APP_NAME, DEFAULT_HTTP_PORT};

use crate::registry::DuplicatePolicy;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API and the WebSocket endpoint.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None`, meaning `parley.db` in the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Ed25519 public key of the login service that signs access tokens
    /// (hex-encoded, 64 chars).
    /// Env: `TOKEN_PUBKEY`
    /// Default: all-zeros, which refuses every token (development only).
    pub token_pubkey: [u8; 32],

    /// What happens when a user opens a second connection.
    /// Env: `DUPLICATE_CONNECTION_POLICY` (`last-wins` / `first-wins`)
    /// Default: `last-wins`
    pub duplicate_policy: DuplicatePolicy,

    /// Human-readable name for this gateway instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Parley"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            token_pubkey: [0u8; 32],
            duplicate_policy: DuplicatePolicy::LastWins,
            instance_name: APP_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. `from_env` passes
    /// the process environment; tests pass a fixed table.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(hex_key) = var("TOKEN_PUBKEY") {
            match parse_hex_pubkey(&hex_key) {
                Ok(key) => config.token_pubkey = key,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid TOKEN_PUBKEY, using default (dev-only)");
                }
            }
        }

        if let Some(policy) = var("DUPLICATE_CONNECTION_POLICY") {
            match policy.parse::<DuplicatePolicy>() {
                Ok(parsed) => config.duplicate_policy = parsed,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid DUPLICATE_CONNECTION_POLICY, using default");
                }
            }
        }

        if let Some(name) = var("INSTANCE_NAME") {
            if !name.is_empty() {
                config.instance_name = name;
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    /// `true` while the token key is still the all-zero development default.
    pub fn token_key_is_default(&self) -> bool {
        self.token_pubkey == [0u8; 32]
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_pubkey(hex_key: &str) -> Result<[u8; 32], String> {
    let hex_key = hex_key.trim();
    if hex_key.len() != 64 {
        return Err(format!("expected 64 hex chars, got {}", hex_key.len()));
    }

    let mut bytes = [0u8; 32];
    hex::decode_to_slice(hex_key, &mut bytes).map_err(|e| e.to_string())?;
    Ok(bytes)
}
