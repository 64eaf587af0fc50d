//! Error types for the engine bridge.
//!
//! Every variant is scoped to one resource: a failure here drops one
//! engine (or one client connection), never the bridge as a whole.

use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineId;

/// Failures surfaced by an `EngineHandle` or a client channel.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The engine executable could not be launched.
    #[error("failed to spawn engine {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine process exited without having been told to quit.
    #[error("{engine} crashed (exit code {})", fmt_code(*code))]
    EngineCrashed { engine: EngineId, code: Option<i32> },

    /// The engine process exited after the terminal command was sent.
    #[error("{engine} exited after quit (exit code {})", fmt_code(*code))]
    EngineQuit { engine: EngineId, code: Option<i32> },

    /// The engine's output stream closed while the process is still alive.
    #[error("{engine} closed its output stream")]
    BrokenPipe { engine: EngineId },

    /// The liveness query itself failed; treated as a crash.
    #[error("failed to query liveness of {engine}: {source}")]
    Probe {
        engine: EngineId,
        #[source]
        source: std::io::Error,
    },

    /// A client channel is closed; sends to it are no longer possible.
    #[error("connection {connection} is closed")]
    ChannelClosed { connection: u64 },
}

impl BridgeError {
    /// True for the normal end of an engine that was asked to quit.
    pub fn is_graceful_exit(&self) -> bool {
        matches!(self, BridgeError::EngineQuit { .. })
    }
}

fn fmt_code(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_messages_name_the_engine_and_code() {
        let err = BridgeError::EngineCrashed {
            engine: EngineId(3),
            code: Some(139),
        };
        assert_eq!(err.to_string(), "engine-3 crashed (exit code 139)");

        let err = BridgeError::EngineCrashed {
            engine: EngineId(1),
            code: None,
        };
        assert_eq!(err.to_string(), "engine-1 crashed (exit code none)");
        assert!(!err.is_graceful_exit());
    }

    #[test]
    fn quit_exit_is_graceful() {
        let err = BridgeError::EngineQuit {
            engine: EngineId(2),
            code: Some(0),
        };
        assert!(err.is_graceful_exit());
        assert_eq!(err.to_string(), "engine-2 exited after quit (exit code 0)");
    }
}
