//! Billing service entry point.

use std::error::Error;

use api::config::BillingServiceConfig;
use billing::{
    HttpInventoryClient, InMemoryInvoiceRepository, InvoiceRepository, PostgresInvoiceRepository,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use saga::{InMemorySagaJournal, PostgresSagaJournal, SagaJournal};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

async fn serve<R, J>(
    repo: R,
    journal: J,
    config: BillingServiceConfig,
    metrics_handle: PrometheusHandle,
) -> Result<(), Box<dyn Error>>
where
    R: InvoiceRepository + Clone + 'static,
    J: SagaJournal + 'static,
{
    let client = HttpInventoryClient::new(config.inventory.clone())?;
    let shutdown = CancellationToken::new();
    let state = api::create_billing_state(
        repo,
        client,
        journal,
        config.saga.clone(),
        shutdown.clone(),
    );

    // Runs interrupted by a previous crash still hold reservations.
    for recovered in state.saga.recover().await? {
        tracing::warn!(
            invoice_id = %recovered.invoice_id,
            phase = %recovered.phase,
            compensations = recovered.compensations.len(),
            unresolved = ?recovered.unresolved,
            retained = recovered.retained,
            "recovered interrupted saga"
        );
    }

    let app = api::create_billing_app(state, metrics_handle);

    let addr = config.server.addr();
    tracing::info!(
        %addr,
        inventory_url = %config.inventory.base_url,
        policy = ?config.saga.confirm_failure_policy,
        "starting billing service"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            api::shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    tracing::info!("billing service shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = BillingServiceConfig::from_env()?;
    api::init_tracing(&config.server.log_level);

    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    match config.server.database_url.clone() {
        Some(url) => {
            let pool = PgPool::connect(&url).await?;
            let repo = PostgresInvoiceRepository::new(pool.clone());
            repo.run_migrations().await?;
            tracing::info!("using PostgreSQL invoice storage");
            serve(repo, PostgresSagaJournal::new(pool), config, metrics_handle).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set, invoices are kept in memory");
            serve(
                InMemoryInvoiceRepository::new(),
                InMemorySagaJournal::new(),
                config,
                metrics_handle,
            )
            .await
        }
    }
}
