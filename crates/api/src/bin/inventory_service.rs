//! Inventory service entry point.

use std::error::Error;

use api::config::InventoryServiceConfig;
use inventory::{InMemoryProductRepository, PostgresProductRepository, ProductRepository};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sqlx::PgPool;

async fn serve<R: ProductRepository + 'static>(
    repo: R,
    config: InventoryServiceConfig,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>> {
    let state = api::create_inventory_state(repo, config.ledger.clone());
    let app = api::create_inventory_app(state, metrics_handle);

    let addr = config.server.addr();
    tracing::info!(
        %addr,
        failure_mode = ?config.ledger.failure_mode,
        "starting inventory service"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(api::shutdown_signal())
        .await?;

    tracing::info!("inventory service shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = InventoryServiceConfig::from_env()?;
    api::init_tracing(&config.server.log_level);

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    match config.server.database_url.clone() {
        Some(url) => {
            let pool = PgPool::connect(&url).await?;
            let repo = PostgresProductRepository::new(pool);
            repo.run_migrations().await?;
            tracing::info!("using PostgreSQL product storage");
            serve(repo, config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, products are kept in memory");
            serve(InMemoryProductRepository::new(), config, metrics_handle).await
        }
    }
}
