//! Listener and top-level server wiring.
//!
//! This module:
//! - Spawns every configured engine (a failed spawn skips that engine).
//! - Listens on the configured address/port.
//! - Spawns:
//!   - a per-client task for each accepted socket,
//!   - a single broadcast loop that owns every `EngineHandle`.
//! - Stops on the shutdown signal, dropping the engines.
//!
//! The per-client logic and the broadcast loop live in `client` and
//! `engine_task` respectively.

use std::future::Future;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use engine_bridge::{EngineHandle, EngineId};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::client::{self, ClientContext};
use crate::config::Config;
use crate::engine_task::BroadcastLoop;
use crate::registry::ConnectionRegistry;
use crate::types::Commanders;

/// Spawn an engine for every path; ids follow path order, starting at 1.
///
/// Engines that fail to launch are logged and skipped. Fails only when
/// none could be started.
pub fn start_engines(paths: &[PathBuf]) -> Result<Vec<EngineHandle>> {
    let mut engines = Vec::with_capacity(paths.len());

    for (index, path) in paths.iter().enumerate() {
        match EngineHandle::spawn(EngineId(index as u64 + 1), path) {
            Ok(engine) => engines.push(engine),
            Err(e) => error!(path = %path.display(), "{e}"),
        }
    }

    if engines.is_empty() {
        bail!("none of the {} configured engine(s) could be started", paths.len());
    }
    Ok(engines)
}

/// Run the server with the given configuration until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;
    let engines = start_engines(&config.engine_paths)?;

    let addr = config.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    serve(listener, engines, &config, shutdown_signal()).await
}

/// Serve clients on `listener` until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, engines: Vec<EngineHandle>, config: &Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let local_addr = listener.local_addr().context("listener has no local address")?;
    info!(
        addr = %local_addr,
        transport = ?config.transport,
        engines = engines.len(),
        max_clients = config.max_clients,
        "listening"
    );

    let registry = ConnectionRegistry::new();
    let commanders: Commanders = engines.iter().map(EngineHandle::commander).collect::<Vec<_>>().into();

    let (stop_tx, stop_rx) = watch::channel(false);
    let broadcast = BroadcastLoop::new(engines, registry.clone(), config.idle_interval);
    let broadcast_task = tokio::spawn(broadcast.run(stop_rx));

    let ctx = ClientContext {
        registry: registry.clone(),
        commanders,
        transport: config.transport,
        ws_path: config.ws_path.clone(),
        max_clients: config.max_clients,
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };

                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = client::serve_connection(stream, peer, ctx).await {
                        warn!(%peer, "client error: {e:#}");
                    }
                });
            }
        }
    }

    let _ = stop_tx.send(true);
    broadcast_task.await.context("broadcast loop panicked")?;
    registry.clear().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
}
