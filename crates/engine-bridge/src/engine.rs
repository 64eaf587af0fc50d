//! One managed engine process.
//!
//! An `EngineHandle` owns:
//! - the child process (through its `ProcessProbe`),
//! - the command queue and its dispatcher,
//! - the output queue fed by the drainer tasks,
//! - the stdin writer task.
//!
//! Nothing outside the handle touches the process directly. Client tasks
//! only ever get an `EngineCommander`.

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dispatcher::{spawn_stdin_writer, CommandDispatcher, Dispatch, EngineCommander};
use crate::drainer::spawn_output_drainer;
use crate::error::BridgeError;
use crate::probe::{EngineExit, ProcessProbe};
use crate::types::{OutputRx, OutputTx};

/// How long a closed output stream may coexist with a live process
/// before it is reported as `BrokenPipe`.
pub const DEFAULT_BROKEN_PIPE_GRACE: Duration = Duration::from_millis(500);

/// How long an exited process's pipes may stay open (a grandchild holding
/// them, say) before the exit is reported anyway.
pub const DEFAULT_EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Identifier for a managed engine, unique for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(pub u64);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

/// Bridge to one engine process.
pub struct EngineHandle {
    id: EngineId,
    label: String,
    dispatcher: CommandDispatcher,
    commander: EngineCommander,
    output: OutputRx,
    probe: Box<dyn ProcessProbe>,
    output_closed_at: Option<Instant>,
    broken_pipe_grace: Duration,
    /// Exit seen by the probe while output may still be in flight.
    exited: Option<(EngineExit, Instant)>,
    exit_drain_grace: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("quit_sent", &self.dispatcher.quit_sent())
            .finish_non_exhaustive()
    }
}

impl EngineHandle {
    /// Launch the executable at `path` and start draining its output.
    ///
    /// stdout and stderr each get a drainer feeding the same output queue.
    /// The process is killed when the handle is dropped.
    pub fn spawn(id: EngineId, path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        Self::spawn_with_args(id, path, std::iter::empty::<&str>())
    }

    /// Like [`EngineHandle::spawn`], passing `args` to the executable.
    pub fn spawn_with_args<I, S>(id: EngineId, path: impl AsRef<Path>, args: I) -> Result<Self, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let path = path.as_ref();
        let spawn_err = |source| BridgeError::Spawn {
            path: path.to_path_buf(),
            source,
        };

        let mut child = Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => return Err(spawn_err(std::io::Error::other("engine pipes unavailable"))),
        };

        let pid = child.id();
        let (mut handle, output_tx) = Self::start(id, path.display().to_string(), stdin, Box::new(child));
        handle
            .tasks
            .push(spawn_output_drainer(id, "stdout", stdout, output_tx.clone()));
        handle
            .tasks
            .push(spawn_output_drainer(id, "stderr", stderr, output_tx));

        info!(engine = %id, path = %handle.label, pid = ?pid, "engine started");
        Ok(handle)
    }

    /// Build a handle over arbitrary pipes and a liveness probe.
    pub fn from_parts<W, R, P>(id: EngineId, label: impl Into<String>, stdin: W, stdout: R, probe: P) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
        P: ProcessProbe + 'static,
    {
        let (mut handle, output_tx) = Self::start(id, label.into(), stdin, Box::new(probe));
        handle
            .tasks
            .push(spawn_output_drainer(id, "stdout", stdout, output_tx));
        handle
    }

    fn start<W>(id: EngineId, label: String, stdin: W, probe: Box<dyn ProcessProbe>) -> (Self, OutputTx)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        let (output_tx, output) = mpsc::unbounded_channel();
        let (dispatcher, commander) = CommandDispatcher::new(id, stdin_tx);
        let writer = spawn_stdin_writer(id, stdin, stdin_rx);

        let handle = Self {
            id,
            label,
            dispatcher,
            commander,
            output,
            probe,
            output_closed_at: None,
            broken_pipe_grace: DEFAULT_BROKEN_PIPE_GRACE,
            exited: None,
            exit_drain_grace: DEFAULT_EXIT_DRAIN_GRACE,
            tasks: vec![writer],
        };
        (handle, output_tx)
    }

    /// Override how long a closed output stream is tolerated.
    pub fn with_broken_pipe_grace(mut self, grace: Duration) -> Self {
        self.broken_pipe_grace = grace;
        self
    }

    /// Override how long an exited engine's open pipes are waited on.
    pub fn with_exit_drain_grace(mut self, grace: Duration) -> Self {
        self.exit_drain_grace = grace;
        self
    }

    pub fn id(&self) -> EngineId {
        self.id
    }

    /// Human readable origin of the engine (usually its path).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn quit_sent(&self) -> bool {
        self.dispatcher.quit_sent()
    }

    /// A cloneable producer for this engine's command queue.
    pub fn commander(&self) -> EngineCommander {
        self.commander.clone()
    }

    /// Append a command. Never blocks, never drops, never validates.
    pub fn enqueue_command(&self, text: impl Into<String>) {
        self.commander.enqueue(text);
    }

    /// Send at most one queued command to the engine.
    pub fn dispatch_next(&mut self) -> Dispatch {
        self.dispatcher.dispatch_next()
    }

    /// Take one output line without waiting.
    ///
    /// Lines already queued are always handed out first. An exit is only
    /// reported once the drainers have hit end of stream, so whatever an
    /// engine printed before exiting still reaches clients.
    pub fn poll_output(&mut self) -> Result<Option<String>, BridgeError> {
        match self.output.try_recv() {
            Ok(line) => Ok(Some(line)),
            Err(TryRecvError::Empty) => match self.probe_exit()? {
                // Exited, but the pipes may still hold unread output.
                Some((exit, seen_at)) if seen_at.elapsed() >= self.exit_drain_grace => {
                    debug!(engine = %self.id, "engine output still open after exit");
                    Err(self.exit_error(exit))
                }
                _ => Ok(None),
            },
            Err(TryRecvError::Disconnected) => match self.probe_exit()? {
                Some((exit, _)) => Err(self.exit_error(exit)),
                None => {
                    self.check_output_closed()?;
                    Ok(None)
                }
            },
        }
    }

    /// Dispatch one command, then poll one output line.
    ///
    /// This is what the broadcast loop calls once per tick, so commands
    /// drain at most one per engine per tick.
    pub fn read_line(&mut self) -> Result<Option<String>, BridgeError> {
        self.dispatch_next();
        self.poll_output()
    }

    /// The process exit and when it was first seen, if it has exited.
    fn probe_exit(&mut self) -> Result<Option<(EngineExit, Instant)>, BridgeError> {
        if self.exited.is_none() {
            let exit = self.probe.try_exit().map_err(|source| BridgeError::Probe {
                engine: self.id,
                source,
            })?;
            self.exited = exit.map(|exit| (exit, Instant::now()));
        }
        Ok(self.exited)
    }

    fn exit_error(&self, EngineExit { code }: EngineExit) -> BridgeError {
        if self.dispatcher.quit_sent() {
            BridgeError::EngineQuit { engine: self.id, code }
        } else {
            BridgeError::EngineCrashed { engine: self.id, code }
        }
    }

    fn check_output_closed(&mut self) -> Result<(), BridgeError> {
        let engine = self.id;
        let closed_at = *self.output_closed_at.get_or_insert_with(|| {
            debug!(%engine, "output stream closed while process is alive");
            Instant::now()
        });

        if closed_at.elapsed() >= self.broken_pipe_grace {
            return Err(BridgeError::BrokenPipe { engine: self.id });
        }
        Ok(())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ManualProbe;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct FakeEngine {
        handle: EngineHandle,
        probe: ManualProbe,
        /// What the engine reads (our stdin writes land here).
        stdin: BufReader<DuplexStream>,
        /// What the engine prints.
        stdout: DuplexStream,
    }

    fn fake_engine() -> FakeEngine {
        let (stdin_bridge, stdin_engine) = tokio::io::duplex(1024);
        let (stdout_engine, stdout_bridge) = tokio::io::duplex(1024);
        let probe = ManualProbe::new();
        let handle = EngineHandle::from_parts(EngineId(7), "fake", stdin_bridge, stdout_bridge, probe.clone());
        FakeEngine {
            handle,
            probe,
            stdin: BufReader::new(stdin_engine),
            stdout: stdout_engine,
        }
    }

    async fn next_output(handle: &mut EngineHandle) -> String {
        for _ in 0..200 {
            if let Some(line) = handle.poll_output().unwrap() {
                return line;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no output from engine");
    }

    /// Poll until the handle reports an exit, collecting the lines seen first.
    async fn drain_until_exit(handle: &mut EngineHandle) -> (Vec<String>, BridgeError) {
        let mut lines = Vec::new();
        for _ in 0..200 {
            match handle.poll_output() {
                Ok(Some(line)) => lines.push(line),
                Ok(None) => tokio::time::sleep(Duration::from_millis(5)).await,
                Err(err) => return (lines, err),
            }
        }
        panic!("engine never reported its exit");
    }

    #[tokio::test]
    async fn poll_on_empty_queue_returns_immediately() {
        let mut engine = fake_engine();
        let started = Instant::now();
        assert_eq!(engine.handle.poll_output().unwrap(), None);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn commands_reach_stdin_in_order_one_per_read() {
        let mut engine = fake_engine();
        engine.handle.enqueue_command("uci");
        engine.handle.enqueue_command("isready");

        assert_eq!(engine.handle.read_line().unwrap(), None);
        let mut line = String::new();
        engine.stdin.read_line(&mut line).await.unwrap();
        assert_eq!(line, "uci\n");

        assert_eq!(engine.handle.read_line().unwrap(), None);
        line.clear();
        engine.stdin.read_line(&mut line).await.unwrap();
        assert_eq!(line, "isready\n");
    }

    #[tokio::test]
    async fn output_lines_come_back_trimmed() {
        let mut engine = fake_engine();
        engine.stdout.write_all(b"bestmove e2e4 ponder e7e5 \r\n").await.unwrap();
        assert_eq!(next_output(&mut engine.handle).await, "bestmove e2e4 ponder e7e5");
    }

    #[tokio::test]
    async fn queued_output_is_drained_before_crash_is_reported() {
        let mut engine = fake_engine();
        engine.stdout.write_all(b"info depth 1\n").await.unwrap();
        // Wait until the drainer has queued the line.
        let first = next_output(&mut engine.handle).await;
        assert_eq!(first, "info depth 1");

        engine.stdout.write_all(b"info depth 2\nbestmove e2e4\n").await.unwrap();
        engine.probe.exit(139);
        // The exit is already visible, but the pipe is still open.
        let mut lines: Vec<String> = engine.handle.poll_output().unwrap().into_iter().collect();

        drop(engine.stdout);
        let (rest, err) = drain_until_exit(&mut engine.handle).await;
        lines.extend(rest);
        assert_eq!(lines, vec!["info depth 2", "bestmove e2e4"]);
        assert!(matches!(
            err,
            BridgeError::EngineCrashed { engine: EngineId(7), code: Some(139) }
        ));
    }

    #[tokio::test]
    async fn exit_after_quit_is_reported_as_graceful() {
        let mut engine = fake_engine();
        engine.handle.enqueue_command("quit");
        engine.handle.dispatch_next();
        assert!(engine.handle.quit_sent());

        engine.probe.exit(0);
        drop(engine.stdout);
        let (lines, err) = drain_until_exit(&mut engine.handle).await;
        assert!(lines.is_empty());
        assert!(err.is_graceful_exit());
    }

    #[tokio::test]
    async fn exit_with_output_left_open_is_reported_after_drain_grace() {
        let FakeEngine { handle, probe, stdout: _stdout, stdin: _stdin } = fake_engine();
        let mut handle = handle.with_exit_drain_grace(Duration::from_millis(30));

        probe.exit(1);
        assert_eq!(handle.poll_output().unwrap(), None);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = handle.poll_output().unwrap_err();
        assert!(matches!(err, BridgeError::EngineCrashed { engine: EngineId(7), code: Some(1) }));
    }

    #[tokio::test]
    async fn closed_output_with_live_process_becomes_broken_pipe() {
        let engine = fake_engine();
        let FakeEngine { handle, stdout, probe: _probe, stdin: _stdin } = engine;
        let mut handle = handle.with_broken_pipe_grace(Duration::from_millis(30));
        drop(stdout);

        // Drainer notices EOF; until the grace expires we only see emptiness.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.poll_output().unwrap(), None);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = handle.poll_output().unwrap_err();
        assert!(matches!(err, BridgeError::BrokenPipe { engine: EngineId(7) }));
    }

    #[tokio::test]
    async fn spawn_of_missing_executable_fails() {
        let err = EngineHandle::spawn(EngineId(1), "/definitely/not/an/engine").unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }));
        assert!(err.to_string().contains("/definitely/not/an/engine"));
    }
}
