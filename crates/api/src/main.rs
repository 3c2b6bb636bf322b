use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use jobforge_api::app::{self, AppServices};
use jobforge_infra::AppConfig;
use jobforge_infra::jobs::default_registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    jobforge_observability::init_with(config.log_format);

    let services = Arc::new(AppServices::from_config(&config, default_registry()?).await?);

    let shutdown = CancellationToken::new();
    let pool = services.spawn_workers(config.workers, config.retry, shutdown.clone());

    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, workers = config.workers, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    pool.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
    shutdown.cancel();
}
