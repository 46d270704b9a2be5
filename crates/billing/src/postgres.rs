use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    BillingError, Invoice, InvoiceId, InvoiceItem, InvoiceStatus, Money, ProductId, Result,
    Version, store::InvoiceRepository,
};

/// PostgreSQL-backed invoice repository.
#[derive(Clone)]
pub struct PostgresInvoiceRepository {
    pool: PgPool,
}

impl PostgresInvoiceRepository {
    /// Creates a new repository on top of a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the billing database migrations (invoices and the saga journal).
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations/billing")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_item(row: &PgRow) -> Result<(InvoiceId, InvoiceItem)> {
        let item = InvoiceItem {
            id: Some(row.try_get("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: row.try_get("quantity")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            name: row.try_get("name")?,
        };
        Ok((InvoiceId::new(row.try_get("invoice_id")?), item))
    }

    fn row_to_invoice(row: &PgRow, items: Vec<InvoiceItem>) -> Result<Invoice> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<InvoiceStatus>()
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: Box::new(e),
            })?;

        let invoice = Invoice::from_storage(
            InvoiceId::new(row.try_get("id")?),
            row.try_get("number")?,
            status,
            row.try_get("created_at")?,
            row.try_get("closed_at")?,
            items,
            Version::new(row.try_get("version")?),
        )
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(invoice)
    }

    async fn items_for(&self, id: InvoiceId) -> Result<Vec<InvoiceItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, invoice_id, product_id, quantity, price_cents, name
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Self::row_to_item(row).map(|(_, item)| item))
            .collect()
    }
}

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    async fn create(&self, number: &str) -> Result<Invoice> {
        let row = sqlx::query(
            r#"
            INSERT INTO invoices (number, status, total_value_cents, version)
            VALUES ($1, $2, 0, $3)
            RETURNING id, number, status, created_at, closed_at, version
            "#,
        )
        .bind(number)
        .bind(InvoiceStatus::Open.as_str())
        .bind(Version::first().as_i64())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_invoice(&row, Vec::new())
    }

    async fn get_by_id(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let row = sqlx::query(
            r#"
            SELECT id, number, status, created_at, closed_at, version
            FROM invoices
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let items = self.items_for(id).await?;
                Self::row_to_invoice(&row, items).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Invoice>> {
        let invoice_rows = sqlx::query(
            r#"
            SELECT id, number, status, created_at, closed_at, version
            FROM invoices
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let item_rows = sqlx::query(
            r#"
            SELECT id, invoice_id, product_id, quantity, price_cents, name
            FROM invoice_items
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items_by_invoice: HashMap<InvoiceId, Vec<InvoiceItem>> = HashMap::new();
        for row in &item_rows {
            let (invoice_id, item) = Self::row_to_item(row)?;
            items_by_invoice.entry(invoice_id).or_default().push(item);
        }

        invoice_rows
            .iter()
            .map(|row| {
                let id = InvoiceId::new(row.try_get("id")?);
                let items = items_by_invoice.remove(&id).unwrap_or_default();
                Self::row_to_invoice(row, items)
            })
            .collect()
    }

    async fn update(&self, invoice: &Invoice, expected_version: Version) -> Result<Invoice> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $1, closed_at = $2, total_value_cents = $3, version = $4
            WHERE id = $5 AND version = $6
            "#,
        )
        .bind(invoice.status().as_str())
        .bind(invoice.closed_at())
        .bind(invoice.total_value().cents())
        .bind(invoice.version().as_i64())
        .bind(invoice.id().as_i64())
        .bind(expected_version.as_i64())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM invoices WHERE id = $1")
                .bind(invoice.id().as_i64())
                .fetch_optional(&mut *tx)
                .await?;

            return Err(match exists {
                Some(_) => BillingError::ConcurrentUpdate {
                    invoice_id: invoice.id(),
                    expected: expected_version,
                },
                None => BillingError::InvoiceNotFound(invoice.id()),
            });
        }

        let mut stored = invoice.clone();
        for item in stored.items_mut() {
            if item.id.is_some() {
                continue;
            }
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO invoice_items (invoice_id, product_id, quantity, price_cents, name)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(invoice.id().as_i64())
            .bind(item.product_id.as_i64())
            .bind(item.quantity)
            .bind(item.price.cents())
            .bind(&item.name)
            .fetch_one(&mut *tx)
            .await?;
            item.id = Some(id);
        }

        tx.commit().await?;
        Ok(stored)
    }
}
