//! engine-bridge
//!
//! Bridge between line-oriented engine subprocesses and the rest of
//! the server:
//! - `EngineHandle`: one spawned engine, its queues and tasks
//! - output drainers: engine stdout/stderr → output queue
//! - command dispatch: command queue → engine stdin, gated by `quit`
//! - `ProcessProbe`: liveness checks

pub mod types;
pub mod probe;
pub mod drainer;
pub mod dispatcher;
pub mod engine;
pub mod error;

pub use dispatcher::{CommandDispatcher, Dispatch, EngineCommander};
pub use engine::{EngineHandle, EngineId, DEFAULT_BROKEN_PIPE_GRACE, DEFAULT_EXIT_DRAIN_GRACE};
pub use error::BridgeError;
pub use probe::{EngineExit, ManualProbe, ProcessProbe};
