//! Central broadcast loop.
//!
//! This task owns every `EngineHandle` and is the only place that polls
//! them. Each tick:
//! 1. every engine gets one `read_line()` (one command out, one line in),
//! 2. the non-empty lines are sent to every open connection in a registry
//!    snapshot,
//! 3. if nothing came back, the loop sleeps for the idle interval.
//!
//! An engine that fails is logged and dropped from later ticks; the loop
//! itself never stops because of one engine or one client. Lines from
//! different engines are interleaved in engine order with no attempt at
//! cross-engine ordering.

use std::time::Duration;

use engine_bridge::{BridgeError, EngineHandle};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::registry::ConnectionRegistry;

/// Default pause between ticks that produced no output.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(10);

pub struct BroadcastLoop {
    engines: Vec<EngineHandle>,
    registry: ConnectionRegistry,
    idle_interval: Duration,
    reported_idle: bool,
}

impl BroadcastLoop {
    pub fn new(engines: Vec<EngineHandle>, registry: ConnectionRegistry, idle_interval: Duration) -> Self {
        Self {
            engines,
            registry,
            idle_interval,
            reported_idle: false,
        }
    }

    /// Engines still taking part in ticks.
    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    /// Step 1 of a tick: poll every engine once and collect its output.
    ///
    /// Failed engines are removed here.
    pub fn tick(&mut self) -> Vec<String> {
        let mut batch = Vec::with_capacity(self.engines.len());

        self.engines.retain_mut(|engine| match engine.read_line() {
            Ok(Some(line)) => {
                if !line.is_empty() {
                    batch.push(line);
                }
                true
            }
            Ok(None) => true,
            Err(err) => {
                report_engine_failure(engine, &err);
                false
            }
        });

        batch
    }

    /// Step 2 of a tick: deliver `batch` to every open connection.
    ///
    /// Returns the number of lines handed to connections.
    pub async fn fan_out(&self, batch: &[String]) -> usize {
        fan_out(&self.registry, batch).await
    }

    /// Run until `shutdown` turns true (or its sender is dropped).
    ///
    /// Engines are dropped on return, which kills their processes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(engines = self.engines.len(), idle_ms = self.idle_interval.as_millis() as u64, "broadcast loop started");
        let registry = self.registry.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = self.tick();

            if batch.is_empty() {
                if self.engines.is_empty() && !self.reported_idle {
                    warn!("all engines have stopped; client commands will be discarded");
                    self.reported_idle = true;
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.idle_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            } else {
                fan_out(&registry, &batch).await;
            }
        }

        info!(engines = self.engines.len(), "broadcast loop shutting down");
    }
}

/// Send each line to every open connection in one registry snapshot.
///
/// Closed connections and those whose send fails are removed from the
/// registry (a no-op if their own task already did so). A connection
/// removed while the batch is going out gets none of the remaining lines.
async fn fan_out(registry: &ConnectionRegistry, batch: &[String]) -> usize {
    let connections = registry.snapshot().await;
    let mut delivered = 0;

    for line in batch {
        trace!(line = %line, clients = connections.len(), "broadcast");
        for conn in &connections {
            if !conn.is_open() {
                // Closed since the snapshot, or its writer is gone.
                registry.remove(conn.id()).await;
                continue;
            }
            match conn.send_text(line) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    debug!(connection = %conn.id(), error = %err, "dropping connection after failed send");
                    registry.remove(conn.id()).await;
                }
            }
        }
        // Let client tasks run between lines; a removal lands before the next one.
        tokio::task::yield_now().await;
    }

    delivered
}

fn report_engine_failure(engine: &EngineHandle, err: &BridgeError) {
    if err.is_graceful_exit() {
        info!(engine = %engine.id(), path = %engine.label(), "{err}");
    } else {
        error!(engine = %engine.id(), path = %engine.label(), "{err}; engine dropped");
    }
}
