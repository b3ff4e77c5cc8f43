use std::net::{SocketAddr, TcpListener};

use anyhow::Context;
use stride_server::{Config, State};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    let state = State::open(&config)?;
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;

    stride_server::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        info!("shutting down");
    })
    .await
}
