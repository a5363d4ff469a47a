//! HTTP/WS surface over the page manager.

pub mod pages;
pub mod recordings;
pub mod router;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServiceConfig;
use crate::manager::PageManager;

#[derive(Clone)]
pub struct ServeState {
    pub manager: Arc<PageManager>,
}

/// Run a mutating operation on its own task. A client that aborts the HTTP
/// request only drops the handler future; the spawned operation still
/// completes, so its recorder append happens regardless.
pub(crate) async fn run_detached<T, F>(operation: F) -> Result<T, crate::errors::ControlError>
where
    F: std::future::Future<Output = Result<T, crate::errors::ControlError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(operation).await {
        Ok(result) => result,
        Err(err) => Err(crate::errors::ControlError::internal(format!(
            "operation task failed: {err}"
        ))),
    }
}

pub async fn serve(
    config: &ServiceConfig,
    manager: Arc<PageManager>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let state = ServeState {
        manager: Arc::clone(&manager),
    };
    let app = router::build_router(config, state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(target: "simplepage", %addr, "listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!(target: "simplepage", "shutdown signal received");
        })
        .await?;

    manager.shutdown().await;
    Ok(())
}
