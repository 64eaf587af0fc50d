// crates/engine-server/src/client.rs

//! Per-client connection tasks.
//!
//! Every accepted socket gets:
//! - a writer task: outbound queue → socket, one line per message,
//! - an inbound reader (this task): socket → commands → every engine.
//!
//! Both transports share the same lifecycle: register after the
//! handshake, forward every received line to all engines, and remove the
//! connection on close, read error or write error. Nothing here touches
//! engine processes or other connections.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use engine_protocol::{split_commands, LineBuffer};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::config::Transport;
use crate::registry::ConnectionRegistry;
use crate::types::{next_connection_id, Commanders, Connection, ConnectionId, OutboundRx};

/// Everything a connection task needs from the server.
#[derive(Clone)]
pub struct ClientContext {
    pub registry: ConnectionRegistry,
    pub commanders: Commanders,
    pub transport: Transport,
    pub ws_path: String,
    pub max_clients: usize,
}

impl ClientContext {
    /// Register a new connection, or refuse it when the server is full.
    async fn admit(&self, peer: SocketAddr) -> Option<(Connection, OutboundRx)> {
        let (conn, out_rx) = Connection::new(next_connection_id());
        if self.registry.try_add(conn.clone(), self.max_clients).await {
            info!(connection = %conn.id(), %peer, "client connected");
            Some((conn, out_rx))
        } else {
            warn!(%peer, max_clients = self.max_clients, "rejecting connection: max_clients reached");
            None
        }
    }

    async fn release(&self, conn: &Connection) {
        if self.registry.remove(conn.id()).await {
            info!(connection = %conn.id(), "client disconnected");
        }
    }
}

/// Serve one accepted socket until the client goes away.
pub async fn serve_connection(stream: TcpStream, peer: SocketAddr, ctx: ClientContext) -> Result<()> {
    match ctx.transport {
        Transport::Websocket => run_ws_client(stream, peer, ctx).await,
        Transport::Tcp => run_tcp_client(stream, peer, ctx).await,
    }
}

/// Enqueue every command in `text` on every engine.
pub fn forward_commands(connection: ConnectionId, text: &str, commanders: &Commanders) {
    for cmd in split_commands(text) {
        debug!(%connection, command = %cmd, "client command");
        for commander in commanders.iter() {
            commander.enqueue(cmd);
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// How long the writer gets to finish the closing handshake.
const WS_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

async fn run_ws_client(stream: TcpStream, peer: SocketAddr, ctx: ClientContext) -> Result<()> {
    let ws_path = ctx.ws_path.clone();
    let check_path = move |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
        if req.uri().path() == ws_path {
            Ok(resp)
        } else {
            let mut err = ErrorResponse::new(Some(format!("no websocket endpoint at {}", req.uri().path())));
            *err.status_mut() = StatusCode::NOT_FOUND;
            Err(err)
        }
    };

    let ws = tokio_tungstenite::accept_hdr_async(stream, check_path)
        .await
        .with_context(|| format!("websocket handshake with {peer} failed"))?;
    let (mut sink, mut source) = ws.split();

    let Some((conn, out_rx)) = ctx.admit(peer).await else {
        let _ = sink.close().await;
        return Ok(());
    };

    let (closing_tx, closing_rx) = oneshot::channel();
    let mut writer = tokio::spawn(write_ws(conn.clone(), out_rx, sink, ctx.registry.clone(), closing_rx));

    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Text(text)) => forward_commands(conn.id(), &text, &ctx.commanders),
            Ok(Message::Binary(data)) => {
                debug!(connection = %conn.id(), len = data.len(), "ignoring binary frame");
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(connection = %conn.id(), error = %e, "websocket read error");
                break;
            }
        }
        if !conn.is_open() {
            break;
        }
    }

    ctx.release(&conn).await;
    let _ = closing_tx.send(());
    if timeout(WS_CLOSE_TIMEOUT, &mut writer).await.is_err() {
        debug!(connection = %conn.id(), "websocket close timed out");
        writer.abort();
    }
    Ok(())
}

/// Outbound queue → socket. On `closing`, finish the close handshake
/// (this also flushes the reply to a client-initiated close).
async fn write_ws(
    conn: Connection,
    mut out_rx: OutboundRx,
    mut sink: WsSink,
    registry: ConnectionRegistry,
    mut closing: oneshot::Receiver<()>,
) {
    loop {
        let line = tokio::select! {
            line = out_rx.recv() => line,
            _ = &mut closing => None,
        };
        let Some(line) = line else { break };
        if !conn.is_open() {
            break;
        }
        if let Err(e) = sink.send(Message::Text(line)).await {
            warn!(connection = %conn.id(), error = %e, "websocket write error");
            registry.remove(conn.id()).await;
            break;
        }
    }
    let _ = sink.close().await;
}

// ---------------------------------------------------------------------------
// Plain TCP, newline-delimited
// ---------------------------------------------------------------------------

async fn run_tcp_client(stream: TcpStream, peer: SocketAddr, ctx: ClientContext) -> Result<()> {
    let _ = stream.set_nodelay(true);
    let Some((conn, out_rx)) = ctx.admit(peer).await else {
        return Ok(());
    };

    let (read_stream, write_stream) = stream.into_split();
    let writer = tokio::spawn(write_tcp(conn.clone(), out_rx, write_stream, ctx.registry.clone()));

    let result = read_tcp(&conn, read_stream, &ctx.commanders).await;

    ctx.release(&conn).await;
    writer.abort();
    result
}

async fn read_tcp(conn: &Connection, mut read_stream: OwnedReadHalf, commanders: &Commanders) -> Result<()> {
    let mut lines = LineBuffer::default();
    let mut temp_buf = [0u8; 1024];

    loop {
        let n = match read_stream.read(&mut temp_buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => {
                warn!(connection = %conn.id(), error = %e, "tcp read error");
                return Ok(());
            }
        };

        lines.push(&temp_buf[..n]);
        while let Some(line) = lines
            .next_line()
            .with_context(|| format!("connection {} sent an oversized line", conn.id()))?
        {
            forward_commands(conn.id(), &line, commanders);
        }

        if !conn.is_open() {
            return Ok(());
        }
    }
}

async fn write_tcp(conn: Connection, mut out_rx: OutboundRx, mut write_stream: OwnedWriteHalf, registry: ConnectionRegistry) {
    while let Some(line) = out_rx.recv().await {
        if !conn.is_open() {
            break;
        }
        let data = format!("{line}\n");
        let written = async {
            write_stream.write_all(data.as_bytes()).await?;
            write_stream.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(connection = %conn.id(), error = %e, "tcp write error");
            registry.remove(conn.id()).await;
            break;
        }
    }
}
