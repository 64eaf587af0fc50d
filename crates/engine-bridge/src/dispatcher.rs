//! Command dispatch for one engine.
//!
//! Producers (client tasks) push commands through an `EngineCommander`.
//! The single consumer, the broadcast loop, pops them one at a time via
//! `CommandDispatcher::dispatch_next`, which enforces:
//!
//! - FIFO, exactly-once hand-off to the engine's stdin,
//! - nothing is written after the terminal command.
//!
//! The actual pipe write happens on a dedicated writer task, so a hung
//! engine that stops reading its stdin stalls only its own writer.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use engine_protocol::{encode_command, is_terminal_command};

use crate::engine::EngineId;
use crate::types::{CommandRx, CommandTx, StdinRx, StdinTx};

/// Cloneable handle for queueing commands to one engine.
#[derive(Debug, Clone)]
pub struct EngineCommander {
    engine: EngineId,
    tx: CommandTx,
}

impl EngineCommander {
    pub fn engine(&self) -> EngineId {
        self.engine
    }

    /// Append a command to the engine's queue.
    ///
    /// Never blocks and never validates. If the engine has already been
    /// dropped the command is discarded.
    pub fn enqueue(&self, cmd: impl Into<String>) {
        let cmd = cmd.into();
        if let Err(mpsc::error::SendError(cmd)) = self.tx.send(cmd) {
            debug!(engine = %self.engine, command = %cmd, "engine gone, command discarded");
        }
    }
}

/// What a single `dispatch_next` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The command queue was empty.
    Idle,
    /// The command was handed to the stdin writer.
    Written(String),
    /// The command was popped but dropped because quit was already sent.
    Discarded(String),
}

/// Consumer side of an engine's command queue.
#[derive(Debug)]
pub struct CommandDispatcher {
    engine: EngineId,
    commands: CommandRx,
    stdin: StdinTx,
    quit_sent: bool,
}

impl CommandDispatcher {
    /// Build a dispatcher feeding `stdin`, plus the commander producers use.
    pub fn new(engine: EngineId, stdin: StdinTx) -> (Self, EngineCommander) {
        let (tx, commands) = mpsc::unbounded_channel();
        let dispatcher = Self {
            engine,
            commands,
            stdin,
            quit_sent: false,
        };
        (dispatcher, EngineCommander { engine, tx })
    }

    pub fn quit_sent(&self) -> bool {
        self.quit_sent
    }

    /// Pop at most one command and pass it on to the engine.
    pub fn dispatch_next(&mut self) -> Dispatch {
        let cmd = match self.commands.try_recv() {
            Ok(cmd) => cmd,
            Err(_) => return Dispatch::Idle,
        };

        if self.quit_sent {
            trace!(engine = %self.engine, command = %cmd, "quit already sent, dropping command");
            return Dispatch::Discarded(cmd);
        }

        debug!(engine = %self.engine, command = %cmd, "dispatching command");
        if self.stdin.send(encode_command(&cmd)).is_err() {
            debug!(engine = %self.engine, command = %cmd, "stdin writer gone, command lost");
        }

        if is_terminal_command(&cmd) {
            self.quit_sent = true;
        }

        Dispatch::Written(cmd)
    }
}

/// Spawn the task that owns an engine's stdin.
///
/// Each queued line is written and flushed before the next one is taken.
/// A write error ends the task; the crash itself is picked up later by
/// the liveness check.
pub fn spawn_stdin_writer<W>(engine: EngineId, writer: W, mut rx: StdinRx) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = writer;

        while let Some(line) = rx.recv().await {
            if let Err(e) = write_line(&mut writer, &line).await {
                warn!(%engine, error = %e, "engine stdin write failed");
                break;
            }
        }

        debug!(%engine, "stdin writer finished");
    })
}

async fn write_line<W>(writer: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
