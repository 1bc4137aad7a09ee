use std::sync::Arc;

use medlink_graph::config::AppConfig;
use medlink_graph::store::PgStore;
use medlink_graph::{build_router, AppState};
use medlink_shared::clients::db::create_pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    medlink_shared::middleware::init_tracing("medlink-graph");

    let config = AppConfig::load()?;
    let port = config.port;

    let pool = create_pool(&config.database_url, config.pool_max_size)?;

    let metrics_handle = medlink_shared::middleware::init_metrics()?;

    let store = Arc::new(PgStore::new(pool));
    let state = Arc::new(AppState::new(config, store, Some(metrics_handle)));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "medlink-graph starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("medlink-graph stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}
