use std::time::Duration;

use statline_server::{api::app_router, build_state, config::Config, init_tracing};

/// How long shutdown waits for in-flight refreshes to persist their results.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing();
    let state = build_state(&config).await?;
    let router = app_router(state.clone(), &config);

    tracing::info!("Listening on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let pending = state.tracker.pending_count();
    if pending > 0 {
        tracing::info!("Waiting for {} refresh(es) to finish", pending);
        if tokio::time::timeout(DRAIN_TIMEOUT, state.tracker.all_settled())
            .await
            .is_err()
        {
            tracing::warn!(
                "Shutting down with {} refresh(es) still running",
                state.tracker.pending_count()
            );
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
