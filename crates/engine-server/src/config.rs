//! Configuration for the engine server.
//!
//! Every option can be given on the command line or through an
//! environment variable:
//!
//! - `ENGINE_PATH...`          (or `DEFAULT_ENGINE_PATH`, one path)
//! - `ENGINE_BIND_ADDR`        (default: "0.0.0.0")
//! - `ENGINE_PORT`             (default: "8000")
//! - `ENGINE_MAX_CLIENTS`      (default: "1024")
//! - `ENGINE_TRANSPORT`        (default: "websocket")
//! - `ENGINE_WS_PATH`          (default: "/ws")
//! - `ENGINE_IDLE_INTERVAL_MS` (default: "10")
//! - `ENGINE_LOG`              (default: `RUST_LOG`, then "info")

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::engine_task::DEFAULT_IDLE_INTERVAL;

/// Command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "engine-server",
    version,
    about = "Bridge line-oriented engine processes to any number of clients"
)]
pub struct Cli {
    /// Engine executables to spawn; every client command goes to all of them.
    #[arg(value_name = "ENGINE_PATH", env = "DEFAULT_ENGINE_PATH")]
    pub engines: Vec<PathBuf>,

    /// IP address / interface to bind to.
    #[arg(long = "bind", env = "ENGINE_BIND_ADDR", default_value = "0.0.0.0")]
    pub bind_addr: String,

    /// Port to listen on.
    #[arg(long, env = "ENGINE_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    #[arg(long, env = "ENGINE_MAX_CLIENTS", default_value_t = 1024)]
    pub max_clients: usize,

    /// How clients talk to the server.
    #[arg(long, value_enum, env = "ENGINE_TRANSPORT", default_value_t = Transport::Websocket)]
    pub transport: Transport,

    /// Request path accepted for WebSocket upgrades.
    #[arg(long, env = "ENGINE_WS_PATH", default_value = "/ws")]
    pub ws_path: String,

    /// Pause between broadcast ticks that produced no output, in milliseconds.
    #[arg(long, env = "ENGINE_IDLE_INTERVAL_MS", default_value_t = 10)]
    pub idle_interval_ms: u64,

    /// Log level. If omitted, `RUST_LOG` or "info" is used.
    #[arg(long, value_enum, env = "ENGINE_LOG", value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Client-facing transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// WebSocket text frames, one or more commands per frame.
    Websocket,
    /// Raw TCP, newline-delimited (netcat friendly).
    Tcp,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no engine executable given (pass ENGINE_PATH or set DEFAULT_ENGINE_PATH)")]
    NoEngines,

    #[error("idle interval must be greater than zero")]
    ZeroIdleInterval,

    #[error("max clients must be greater than zero")]
    ZeroMaxClients,

    #[error("websocket path must start with '/': {0}")]
    InvalidWsPath(String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Engine executables, spawned in this order.
    pub engine_paths: Vec<PathBuf>,

    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// Port to listen on.
    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,

    pub transport: Transport,

    pub ws_path: String,

    /// Pause between broadcast ticks that produced no output.
    pub idle_interval: Duration,

    pub log_level: Option<LogLevel>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine_paths: Vec::new(),
            bind_addr: "0.0.0.0".to_string(),
            port: 8000,
            max_clients: 1024,
            transport: Transport::Websocket,
            ws_path: "/ws".to_string(),
            idle_interval: DEFAULT_IDLE_INTERVAL,
            log_level: None,
        }
    }
}

impl Config {
    /// Build and validate a `Config` from parsed arguments.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let config = Config {
            engine_paths: cli.engines,
            bind_addr: cli.bind_addr,
            port: cli.port,
            max_clients: cli.max_clients,
            transport: cli.transport,
            ws_path: cli.ws_path,
            idle_interval: Duration::from_millis(cli.idle_interval_ms),
            log_level: cli.log_level,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine_paths.is_empty() {
            return Err(ConfigError::NoEngines);
        }
        if self.idle_interval.is_zero() {
            return Err(ConfigError::ZeroIdleInterval);
        }
        if self.max_clients == 0 {
            return Err(ConfigError::ZeroMaxClients);
        }
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidWsPath(self.ws_path.clone()));
        }
        Ok(())
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
