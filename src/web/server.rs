use anyhow::Context;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::control::BotController;
use crate::web::create_router;

/// Serve the control API until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    bot: Arc<BotController>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await.with_context(|| {
        format!("Failed to bind control API to {} (is another instance running?)", addr)
    })?;

    tracing::info!("🌐 Control API listening on http://{}", addr);

    axum::serve(listener, create_router(bot))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Control API server error")?;

    tracing::info!("🌐 Control API stopped");
    Ok(())
}
