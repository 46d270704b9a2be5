//! PostgreSQL integration tests for the product repository.
//!
//! These tests share one PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;

use inventory::{
    LedgerConfig, LedgerError, Money, NewProduct, PostgresProductRepository, ProductId,
    ProductRepository, StockLedger, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/inventory/001_create_products_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_repo() -> PostgresProductRepository {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE products RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresProductRepository::new(pool)
}

fn widget(stock: i64) -> NewProduct {
    NewProduct::new("Widget", Money::from_cents(1999), stock).unwrap()
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn create_and_load_product() {
    let repo = get_test_repo().await;

    let created = repo.create(widget(10)).await.unwrap();
    assert_eq!(created.version(), Version::first());
    assert_eq!(created.reserved_stock(), 0);

    let loaded = repo.get_by_id(created.id()).await.unwrap().unwrap();
    assert_eq!(loaded.name(), "Widget");
    assert_eq!(loaded.price(), Money::from_cents(1999));
    assert_eq!(loaded.stock(), 10);

    assert!(repo.get_by_id(ProductId::new(999)).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn list_orders_by_id() {
    let repo = get_test_repo().await;
    let first = repo.create(widget(1)).await.unwrap();
    let second = repo.create(widget(2)).await.unwrap();

    let ids: Vec<_> = repo.list().await.unwrap().iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec![first.id(), second.id()]);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn stale_update_is_rejected() {
    let repo = get_test_repo().await;
    let created = repo.create(widget(10)).await.unwrap();

    let mut first = created.clone();
    first.reserve(3).unwrap();
    repo.update(&first, created.version()).await.unwrap();

    let mut stale = created.clone();
    stale.reserve(5).unwrap();
    let err = repo.update(&stale, created.version()).await.unwrap_err();
    assert!(matches!(err, LedgerError::ConcurrentUpdate { .. }));

    let stored = repo.get_by_id(created.id()).await.unwrap().unwrap();
    assert_eq!(stored.reserved_stock(), 3);
    assert_eq!(stored.version(), Version::new(2));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn update_of_missing_row_reports_not_found() {
    let repo = get_test_repo().await;
    let created = repo.create(widget(10)).await.unwrap();

    sqlx::query("DELETE FROM products")
        .execute(repo.pool())
        .await
        .unwrap();

    let mut product = created.clone();
    product.reserve(1).unwrap();
    let err = repo.update(&product, created.version()).await.unwrap_err();
    assert!(matches!(err, LedgerError::ProductNotFound(_)));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn ledger_cycle_against_postgres() {
    let ledger = StockLedger::new(get_test_repo().await, LedgerConfig::default());
    let id = ledger
        .create_product("Gadget".to_string(), Money::from_cents(250), 10)
        .await
        .unwrap()
        .id();

    ledger.reserve_stock(id, 7).await.unwrap();
    ledger.confirm_reservation(id, 7).await.unwrap();

    let stored = ledger.get_product(id).await.unwrap();
    assert_eq!(stored.stock(), 3);
    assert_eq!(stored.reserved_stock(), 0);
    assert_eq!(stored.version(), Version::new(3));

    let err = ledger.reserve_stock(id, 4).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientStock { .. }));
}
