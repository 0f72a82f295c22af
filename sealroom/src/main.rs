//! `sealroom`: line-oriented end-to-end encrypted room chat.
//!
//! Joins a room on a `sealroom-relay`, exchanges ephemeral keys with the
//! other member, then sends every stdin line encrypted and prints what
//! arrives. Configuration via CLI flags, environment variables, or config
//! file (`~/.config/sealroom/config.toml`).
//!
//! ```bash
//! cargo run --bin sealroom -- --relay-url ws://127.0.0.1:3000/ws \
//!     --username alice --room room1
//!
//! SEALROOM_USERNAME=bob SEALROOM_ROOM=room1 cargo run --bin sealroom
//! ```

use std::io;

use clap::Parser;
use sealroom::chat::session::SessionError;
use sealroom::chat::{ChatClient, ChatError};
use sealroom::config::{CliArgs, ClientConfig};
use sealroom_proto::event::ServerEvent;
use tokio::io::{AsyncBufReadExt, BufReader};

/// One thing the main loop woke up for.
enum Input {
    Line(io::Result<Option<String>>),
    Relay(Result<ServerEvent, ChatError>),
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&cli.log_level);

    let net_config = config.to_net_config();
    let mut client = match ChatClient::connect(&net_config).await {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Could not connect to {}: {e}", net_config.relay_url);
            std::process::exit(1);
        }
    };

    println!(
        "* joined {} as {} (key {})",
        client.session().room(),
        client.session().username(),
        client.session().fingerprint().unwrap_or_default()
    );

    let result = run(&mut client).await;
    client.close().await;
    tracing::info!("sealroom exiting");
    result
}

/// Logs go to stderr; stdout carries only chat output.
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(env_filter)
        .init();
}

async fn run(client: &mut ChatClient) -> io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        // Both futures are cancel-safe; the losing one is simply retried.
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line),
            event = client.recv_event() => Input::Relay(event),
        };

        match input {
            Input::Line(Ok(Some(line))) => match client.send_text(&line).await {
                Ok(()) | Err(ChatError::Session(SessionError::EmptyMessage)) => {}
                Err(ChatError::Session(e)) => eprintln!("! {e}"),
                Err(e @ ChatError::Transport(_)) => {
                    eprintln!("! {e}");
                    return Ok(());
                }
            },
            Input::Line(Ok(None)) => return Ok(()),
            Input::Line(Err(e)) => return Err(e),
            Input::Relay(Ok(event)) => match client.handle(event).await {
                Ok(event) => println!("{event}"),
                Err(e) => {
                    eprintln!("! {e}");
                    return Ok(());
                }
            },
            Input::Relay(Err(e)) => {
                eprintln!("! relay connection lost: {e}");
                return Ok(());
            }
        }
    }
}
