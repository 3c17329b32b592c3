//! Listener lifecycle.

use std::future::Future;

use gflow_core::ServerConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::error::ServerResult;
use crate::router::build_router;
use crate::state::AppState;

/// Bind `config`'s address and serve until `shutdown` resolves.
///
/// In-flight evaluations whose clients are still connected run to completion
/// before this returns.
pub async fn serve<F>(state: AppState, config: &ServerConfig, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(config.bind_address()).await?;
    let local = listener.local_addr()?;
    info!("Gradeflow listening on http://{}", local);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}
