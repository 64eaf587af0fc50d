//! Output drainer.
//!
//! One task per engine output stream. It blocks (asynchronously) on the
//! next line and pushes it into the engine's output queue, so nothing
//! else in the system ever waits on an engine's pipe. The queue is
//! unbounded: a chatty engine is never slowed down by slow clients.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use engine_protocol::normalize_output_line;

use crate::engine::EngineId;
use crate::types::OutputTx;

/// Spawn a drainer for one output stream of `engine`.
///
/// `stream` is only used for logs ("stdout" / "stderr"). The task ends
/// on end-of-stream, on a read error, or when the output queue has no
/// receiver left.
pub fn spawn_output_drainer<R>(
    engine: EngineId,
    stream: &'static str,
    reader: R,
    output_tx: OutputTx,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        drain_lines(engine, stream, reader, output_tx).await;
    })
}

async fn drain_lines<R>(engine: EngineId, stream: &'static str, reader: R, output_tx: OutputTx)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::with_capacity(256);

    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => {
                debug!(%engine, stream, "end of output stream");
                break;
            }
            Ok(_) => {
                let line = normalize_output_line(&raw);
                trace!(%engine, stream, line = %line, "engine output");
                if output_tx.send(line).is_err() {
                    debug!(%engine, stream, "output queue dropped, stopping drainer");
                    break;
                }
            }
            Err(e) => {
                warn!(%engine, stream, error = %e, "engine output read failed");
                break;
            }
        }
    }
}
