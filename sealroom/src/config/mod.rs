//! Configuration for the `sealroom` client.
//!
//! Layered, highest priority first:
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/sealroom/config.toml`)
//! 4. Compiled defaults
//!
//! A missing default config file is not an error. An explicit `--config`
//! path that doesn't exist is.

use std::path::PathBuf;
use std::time::Duration;

use crate::chat::session::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_ROOM, DEFAULT_USERNAME};

/// Relay URL used when none is configured.
pub const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:3000/ws";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    relay_url: Option<String>,
    username: Option<String>,
    room: Option<String>,
    connect_timeout_secs: Option<u64>,
    channel_capacity: Option<usize>,
    max_message_size: Option<usize>,
    announce_on_join: Option<bool>,
}

/// Everything [`ChatClient::connect`](crate::chat::ChatClient::connect)
/// needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    /// Relay WebSocket URL.
    pub relay_url: String,
    /// Display name sent with the public key and every message.
    pub username: String,
    /// Room to join.
    pub room: String,
    /// Bound on connecting and on waiting for the relay's greeting.
    pub connect_timeout: Duration,
    /// Capacity of the inbound event channel.
    pub channel_capacity: usize,
    /// Largest encrypted frame the client will send.
    pub max_message_size: usize,
    /// Re-send the public key whenever a peer joins the room.
    pub announce_on_join: bool,
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay server WebSocket URL.
    pub relay_url: String,
    /// Display name.
    pub username: String,
    /// Room name.
    pub room: String,
    /// Timeout for connecting to the relay server.
    pub connect_timeout: Duration,
    /// Channel capacity for inbound relay events.
    pub channel_capacity: usize,
    /// Largest encrypted frame to send; keep in step with the relay.
    pub max_message_size: usize,
    /// Answer `peer-joined` with the local public key.
    pub announce_on_join: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            room: DEFAULT_ROOM.to_string(),
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 256,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            announce_on_join: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// or if any config file that exists cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            relay_url: cli
                .relay_url
                .clone()
                .or_else(|| file.network.relay_url.clone())
                .unwrap_or(defaults.relay_url),
            username: cli
                .username
                .clone()
                .or_else(|| file.network.username.clone())
                .unwrap_or(defaults.username),
            room: cli
                .room
                .clone()
                .or_else(|| file.network.room.clone())
                .unwrap_or(defaults.room),
            connect_timeout: file
                .network
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            channel_capacity: file
                .network
                .channel_capacity
                .filter(|&c| c > 0)
                .unwrap_or(defaults.channel_capacity),
            max_message_size: cli
                .max_message_size
                .or(file.network.max_message_size)
                .unwrap_or(defaults.max_message_size),
            announce_on_join: file
                .network
                .announce_on_join
                .unwrap_or(defaults.announce_on_join),
        }
    }

    /// The subset of settings the chat client needs.
    #[must_use]
    pub fn to_net_config(&self) -> NetConfig {
        NetConfig {
            relay_url: self.relay_url.clone(),
            username: self.username.clone(),
            room: self.room.clone(),
            connect_timeout: self.connect_timeout,
            channel_capacity: self.channel_capacity,
            max_message_size: self.max_message_size,
            announce_on_join: self.announce_on_join,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "End-to-end encrypted room chat over a blind relay")]
pub struct CliArgs {
    /// WebSocket URL of the relay server.
    #[arg(long, env = "SEALROOM_RELAY_URL")]
    pub relay_url: Option<String>,

    /// Display name shown to other members.
    #[arg(short, long, env = "SEALROOM_USERNAME")]
    pub username: Option<String>,

    /// Room to join.
    #[arg(short, long, env = "SEALROOM_ROOM")]
    pub room: Option<String>,

    /// Largest encrypted message to send, in bytes.
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Path to config file (default: `~/.config/sealroom/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn", env = "SEALROOM_LOG")]
    pub log_level: String,
}

/// Load and parse a TOML config file.
///
/// `Some` path must exist. With `None` the default path is tried and a
/// missing file yields an empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("sealroom").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
