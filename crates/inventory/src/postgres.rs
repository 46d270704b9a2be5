use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    LedgerError, Money, NewProduct, Product, ProductId, Result, Version,
    store::ProductRepository,
};

/// PostgreSQL-backed product repository.
#[derive(Clone)]
pub struct PostgresProductRepository {
    pool: PgPool,
}

impl PostgresProductRepository {
    /// Creates a new repository on top of a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the inventory database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations/inventory")
            .run(&self.pool)
            .await
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product::from_storage(
            ProductId::new(row.try_get("id")?),
            row.try_get("name")?,
            Money::from_cents(row.try_get("price_cents")?),
            row.try_get("stock")?,
            row.try_get("reserved_stock")?,
            Version::new(row.try_get("version")?),
            row.try_get("created_at")?,
        ))
    }
}

#[async_trait]
impl ProductRepository for PostgresProductRepository {
    async fn create(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(
            r#"
            INSERT INTO products (name, price_cents, stock, reserved_stock, version)
            VALUES ($1, $2, $3, 0, $4)
            RETURNING id, name, price_cents, stock, reserved_stock, version, created_at
            "#,
        )
        .bind(product.name())
        .bind(product.price().cents())
        .bind(product.stock())
        .bind(Version::first().as_i64())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, price_cents, stock, reserved_stock, version, created_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, price_cents, stock, reserved_stock, version, created_at
            FROM products
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn update(&self, product: &Product, expected_version: Version) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = $1, reserved_stock = $2, version = $3
            WHERE id = $4 AND version = $5
            "#,
        )
        .bind(product.stock())
        .bind(product.reserved_stock())
        .bind(product.version().as_i64())
        .bind(product.id().as_i64())
        .bind(expected_version.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Zero rows means either a lost race or a missing row.
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1")
                .bind(product.id().as_i64())
                .fetch_optional(&self.pool)
                .await?;

            return Err(match exists {
                Some(_) => LedgerError::ConcurrentUpdate {
                    product_id: product.id(),
                    expected: expected_version,
                },
                None => LedgerError::ProductNotFound(product.id()),
            });
        }

        Ok(())
    }
}
