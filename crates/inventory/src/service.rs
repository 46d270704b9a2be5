//! Stock ledger service providing the reserve/confirm/cancel API.

use std::str::FromStr;

use crate::product::validate_quantity;
use crate::{
    LedgerError, Money, NewProduct, Product, ProductId, Result, store::ProductRepository,
};

/// Operations that mutate a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOperation {
    Reserve,
    Confirm,
    Cancel,
}

impl LedgerOperation {
    /// Returns the operation name as used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerOperation::Reserve => "reserve",
            LedgerOperation::Confirm => "confirm",
            LedgerOperation::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Injected failure used to exercise the saga's compensation paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    None,
    /// Every reservation fails.
    Reserve,
    /// Every confirmation fails.
    Confirm,
    /// Every cancellation fails.
    Cancel,
}

impl FailureMode {
    fn fails(&self, operation: LedgerOperation) -> bool {
        matches!(
            (self, operation),
            (FailureMode::Reserve, LedgerOperation::Reserve)
                | (FailureMode::Confirm, LedgerOperation::Confirm)
                | (FailureMode::Cancel, LedgerOperation::Cancel)
        )
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(FailureMode::None),
            "reserve" => Ok(FailureMode::Reserve),
            "confirm" => Ok(FailureMode::Confirm),
            "cancel" => Ok(FailureMode::Cancel),
            other => Err(format!("unknown failure mode: {other}")),
        }
    }
}

/// Ledger configuration, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct LedgerConfig {
    pub failure_mode: FailureMode,
}

/// Service for managing stock.
///
/// Loads a row, applies the mutation to the copy, and writes it back
/// conditioned on the version it read. It never retries: a lost race comes
/// back to the caller as [`LedgerError::ConcurrentUpdate`].
pub struct StockLedger<R: ProductRepository> {
    repo: R,
    config: LedgerConfig,
}

impl<R: ProductRepository> StockLedger<R> {
    /// Creates a new ledger on top of the given repository.
    pub fn new(repo: R, config: LedgerConfig) -> Self {
        Self { repo, config }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Creates a new product with the given initial stock.
    #[tracing::instrument(skip(self))]
    pub async fn create_product(&self, name: String, price: Money, stock: i64) -> Result<Product> {
        let product = self.repo.create(NewProduct::new(name, price, stock)?).await?;
        tracing::info!(product_id = %product.id(), stock, "product created");
        Ok(product)
    }

    /// Loads a product, failing if it does not exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(LedgerError::ProductNotFound(id))
    }

    /// Lists all products.
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.repo.list().await
    }

    /// Reserves `quantity` units of a product.
    #[tracing::instrument(skip(self))]
    pub async fn reserve_stock(&self, id: ProductId, quantity: i64) -> Result<Product> {
        self.mutate(LedgerOperation::Reserve, id, quantity, |p| p.reserve(quantity))
            .await
    }

    /// Confirms a reservation, removing the units from total stock.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_reservation(&self, id: ProductId, quantity: i64) -> Result<Product> {
        self.mutate(LedgerOperation::Confirm, id, quantity, |p| p.confirm(quantity))
            .await
    }

    /// Cancels a reservation, returning the units to the available pool.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_reservation(&self, id: ProductId, quantity: i64) -> Result<Product> {
        self.mutate(LedgerOperation::Cancel, id, quantity, |p| p.cancel(quantity))
            .await
    }

    async fn mutate<F>(
        &self,
        operation: LedgerOperation,
        id: ProductId,
        quantity: i64,
        apply: F,
    ) -> Result<Product>
    where
        F: FnOnce(&mut Product) -> Result<()>,
    {
        let result = self.try_mutate(operation, id, quantity, apply).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(LedgerError::ConcurrentUpdate { .. }) => "conflict",
            Err(_) => "rejected",
        };
        metrics::counter!(
            "ledger_operations_total",
            "operation" => operation.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        if outcome == "conflict" {
            metrics::counter!("ledger_conflicts_total", "operation" => operation.as_str())
                .increment(1);
        }

        match &result {
            Ok(product) => tracing::info!(
                %operation,
                product_id = %id,
                quantity,
                stock = product.stock(),
                reserved_stock = product.reserved_stock(),
                version = %product.version(),
                "stock updated"
            ),
            Err(e) if e.is_retryable() => {
                tracing::warn!(%operation, product_id = %id, quantity, error = %e, "lost version race")
            }
            Err(e) => {
                tracing::warn!(%operation, product_id = %id, quantity, error = %e, "stock operation rejected")
            }
        }

        result
    }

    async fn try_mutate<F>(
        &self,
        operation: LedgerOperation,
        id: ProductId,
        quantity: i64,
        apply: F,
    ) -> Result<Product>
    where
        F: FnOnce(&mut Product) -> Result<()>,
    {
        validate_quantity(quantity)?;

        if self.config.failure_mode.fails(operation) {
            return Err(LedgerError::SimulatedFailure {
                operation: operation.as_str(),
            });
        }

        let mut product = self.get_product(id).await?;
        let expected_version = product.version();

        apply(&mut product)?;
        self.repo.update(&product, expected_version).await?;

        Ok(product)
    }
}
