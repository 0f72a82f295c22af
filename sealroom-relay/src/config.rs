//! Relay configuration.
//!
//! Each setting is taken from the first source that has it: command line
//! (or its environment variable, such as `PORT`), then the `[server]`
//! table of `~/.config/sealroom-relay/config.toml`, then the defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Errors that can occur when loading relay configuration.
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

/// `[server]` overrides read from the config file.
#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
    max_message_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RelayConfigFile {
    #[serde(default)]
    server: ServerSection,
}

impl RelayConfigFile {
    /// Reads `explicit` if given (it must exist), otherwise the default
    /// location, where a missing file means "no overrides".
    fn read(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => match dirs::config_dir() {
                Some(dir) => (dir.join("sealroom-relay").join("config.toml"), false),
                None => return Ok(Self::default()),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::ReadFile { path, source }),
        }
    }
}

/// Command line of `sealroom-relay`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "SealRoom relay server")]
pub struct RelayCliArgs {
    /// Host or IP address to bind to.
    #[arg(long, env = "RELAY_HOST")]
    pub host: Option<String>,

    /// Port to listen on.
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Config file (default: `~/.config/sealroom-relay/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest WebSocket message accepted from a client, in bytes.
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Log level filter, used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "RELAY_LOG")]
    pub log_level: String,
}

/// Resolved relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Bind address, `0.0.0.0` by default.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Frames above this size close the sending connection.
    pub max_message_size: usize,
    /// `EnvFilter` directive.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_message_size: 64 * 1024,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Resolves the configuration for `cli`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit `--config` file is missing,
    /// or if any config file found cannot be read or parsed.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = RelayConfigFile::read(cli.config.as_deref())?;
        Ok(Self::merge(cli, file.server))
    }

    fn merge(cli: &RelayCliArgs, file: ServerSection) -> Self {
        let defaults = Self::default();
        Self {
            host: cli.host.clone().or(file.host).unwrap_or(defaults.host),
            port: cli.port.or(file.port).unwrap_or(defaults.port),
            max_message_size: cli
                .max_message_size
                .or(file.max_message_size)
                .unwrap_or(defaults.max_message_size),
            log_level: cli.log_level.clone(),
        }
    }

    /// The `host:port` string to bind the listener to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
