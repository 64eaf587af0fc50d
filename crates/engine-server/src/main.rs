//! WebSocket/TCP server bridging engine processes to clients.

use clap::Parser;
use engine_server::config::{Cli, Config};
use engine_server::{logging, server};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_cli(Cli::parse())?;
    logging::init_logging(config.log_level);

    info!(
        bind = %config.socket_addr_string(),
        engines = config.engine_paths.len(),
        max_clients = config.max_clients,
        "starting engine-server"
    );

    server::run(config).await
}
