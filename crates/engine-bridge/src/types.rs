//! Shared channel aliases for the bridge.
//!
//! - command queue: client tasks → `CommandDispatcher`
//! - stdin queue: `CommandDispatcher` → stdin writer task
//! - output queue: drainer tasks → `EngineHandle::poll_output`

use tokio::sync::mpsc;

/// Commands waiting to be dispatched to one engine.
pub type CommandTx = mpsc::UnboundedSender<String>;
pub type CommandRx = mpsc::UnboundedReceiver<String>;

/// Encoded lines handed to the stdin writer.
pub type StdinTx = mpsc::UnboundedSender<String>;
pub type StdinRx = mpsc::UnboundedReceiver<String>;

/// Normalized output lines produced by one engine.
pub type OutputTx = mpsc::UnboundedSender<String>;
pub type OutputRx = mpsc::UnboundedReceiver<String>;
