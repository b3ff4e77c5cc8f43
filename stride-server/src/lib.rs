use std::future::Future;
use std::net::TcpListener;

use tracing::info;

pub mod config;
pub mod error;
mod routes;
pub mod state;

pub use config::Config;
pub use error::{AppError, Result};
pub use routes::router;
pub use state::State;

/// Serve the API on an already bound listener until `shutdown` resolves,
/// then flush the database.
pub async fn serve(
    listener: TcpListener,
    state: State,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    info!("listening on {}", listener.local_addr()?);
    let app = router(state.clone());
    axum::Server::from_tcp(listener)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    state.flush()?;
    Ok(())
}
