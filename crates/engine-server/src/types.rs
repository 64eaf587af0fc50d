//! Shared types for the engine server.
//!
//! This module defines:
//! - `ConnectionId`: a lightweight handle for connected clients
//! - `Connection`: the broadcast side of one client channel
//! - channel aliases between the broadcast loop and client writer tasks
//! - `Commanders`: every engine's command queue, shared by client readers

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use engine_bridge::{BridgeError, EngineCommander};
use tokio::sync::mpsc;

/// Identifier for a connected client.
///
/// This is intentionally opaque; we just guarantee uniqueness
/// over the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-wide connection id.
pub fn next_connection_id() -> ConnectionId {
    ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Outbound lines from the broadcast loop to a given client.
pub type OutboundTx = mpsc::UnboundedSender<String>;
pub type OutboundRx = mpsc::UnboundedReceiver<String>;

/// Command queues of every managed engine.
///
/// Each client command is enqueued on all of them.
pub type Commanders = Arc<[EngineCommander]>;

/// Broadcast handle for one client.
///
/// Sending only queues the line for the client's writer task, so a slow
/// socket never holds up the broadcast loop. Clones share the open flag.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    tx: OutboundTx,
    open: Arc<AtomicBool>,
}

impl Connection {
    /// Create a connection and the receiver its writer task drains.
    pub fn new(id: ConnectionId) -> (Self, OutboundRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            id,
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// False once the connection was closed or its writer went away.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Mark the connection closed. Later sends fail with `ChannelClosed`.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Queue one line for delivery to the client.
    pub fn send_text(&self, line: &str) -> Result<(), BridgeError> {
        let closed = BridgeError::ChannelClosed {
            connection: self.id.0,
        };
        if !self.is_open() {
            return Err(closed);
        }
        self.tx.send(line.to_string()).map_err(|_| {
            self.close();
            closed
        })
    }
}
