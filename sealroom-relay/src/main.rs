//! `SealRoom` relay server: room fan-out for end-to-end encrypted chat.
//!
//! An axum WebSocket server that forwards public keys and encrypted
//! envelopes to the other members of a named room. The relay never sees
//! plaintext; it only forwards opaque JSON.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:3000
//! cargo run --bin sealroom-relay
//!
//! # Custom port via flag or environment
//! cargo run --bin sealroom-relay -- --port 8080
//! PORT=8080 cargo run --bin sealroom-relay
//! ```

use std::sync::Arc;

use clap::Parser;
use sealroom_relay::config::{RelayCliArgs, RelayConfig};
use sealroom_relay::relay::{self, RelayState};

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let bind_addr = config.bind_addr();
    tracing::info!(addr = %bind_addr, "starting sealroom relay server");

    let state = Arc::new(RelayState::with_config(config.max_message_size));

    match relay::start_server_with_state(&bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
