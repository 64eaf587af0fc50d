//! engine-server
//!
//! Multi-client server bridging engine processes to WebSocket/TCP clients.
//!
//! - [`engine_task`]: the broadcast loop polling every engine
//! - [`registry`]: connected clients, snapshot-then-iterate
//! - [`server`]: listener, engine startup, shutdown

pub mod config;
pub mod types;
pub mod registry;
pub mod engine_task;
pub mod logging;
pub mod server;

// internal: per-connection I/O
mod client;

pub use config::{Cli, Config, ConfigError, Transport};
pub use engine_task::BroadcastLoop;
pub use registry::ConnectionRegistry;
pub use types::{Connection, ConnectionId};
