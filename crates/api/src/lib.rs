//! HTTP services for the stock ledger and invoice billing.
//!
//! The inventory service exposes the stock ledger; the billing service owns
//! invoices and finalizes them through the saga against the inventory
//! service. Both come with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use billing::{InventoryClient, InvoiceRepository, InvoiceService};
use inventory::{LedgerConfig, ProductRepository, StockLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{SagaConfig, SagaCoordinator, SagaJournal};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use routes::invoices::BillingState;
use routes::products::InventoryState;

/// Creates the inventory service router.
pub fn create_inventory_app<R: ProductRepository + 'static>(
    state: Arc<InventoryState<R>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let products = Router::new()
        .route(
            "/products",
            post(routes::products::create::<R>).get(routes::products::list::<R>),
        )
        .route("/products/{id}", get(routes::products::get::<R>))
        .route(
            "/products/{id}/reserve-stock",
            post(routes::products::reserve::<R>),
        )
        .route(
            "/products/{id}/confirm-stock",
            post(routes::products::confirm::<R>),
        )
        .route(
            "/products/{id}/cancel-reserve",
            post(routes::products::cancel::<R>),
        )
        .with_state(state);

    with_common_routes(products, "inventory-service", metrics_handle)
}

/// Creates the billing service router.
pub fn create_billing_app<R, C, J>(
    state: Arc<BillingState<R, C, J>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    R: InvoiceRepository + 'static,
    C: InventoryClient + 'static,
    J: SagaJournal + 'static,
{
    let invoices = Router::new()
        .route(
            "/invoices",
            post(routes::invoices::create::<R, C, J>).get(routes::invoices::list::<R, C, J>),
        )
        .route("/invoices/{id}", get(routes::invoices::get::<R, C, J>))
        .route(
            "/invoices/{id}/items",
            post(routes::invoices::add_item::<R, C, J>),
        )
        .route(
            "/invoices/{id}/print",
            post(routes::invoices::print::<R, C, J>),
        )
        .with_state(state);

    with_common_routes(invoices, "billing-service", metrics_handle)
}

fn with_common_routes(
    router: Router,
    service: &'static str,
    metrics_handle: PrometheusHandle,
) -> Router {
    let health_router = Router::new()
        .route("/health", get(routes::health::check))
        .with_state(service);
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    router
        .merge(health_router)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the inventory service state over a product repository.
pub fn create_inventory_state<R: ProductRepository>(
    repo: R,
    config: LedgerConfig,
) -> Arc<InventoryState<R>> {
    Arc::new(InventoryState {
        ledger: StockLedger::new(repo, config),
    })
}

/// Builds the billing service state.
///
/// The invoice service and the saga share the same repository and client.
pub fn create_billing_state<R, C, J>(
    repo: R,
    inventory: C,
    journal: J,
    config: SagaConfig,
    shutdown: CancellationToken,
) -> Arc<BillingState<R, C, J>>
where
    R: InvoiceRepository + Clone,
    C: InventoryClient + Clone,
    J: SagaJournal,
{
    Arc::new(BillingState {
        invoices: InvoiceService::new(repo.clone(), inventory.clone()),
        saga: SagaCoordinator::new(repo, inventory, journal, config),
        shutdown,
    })
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}
