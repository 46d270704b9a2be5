use thiserror::Error;

use crate::{InvoiceId, ProductId, Version};

/// Rule violations raised by the invoice aggregate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvoiceError {
    #[error("Invoice {0} is already closed")]
    AlreadyClosed(InvoiceId),

    #[error("Invoice {0} has no items")]
    EmptyInvoice(InvoiceId),

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    #[error("Invalid price: {cents} cents (must not be negative)")]
    InvalidPrice { cents: i64 },

    #[error("Total of invoice {0} exceeds the representable amount")]
    TotalOverflow(InvoiceId),
}

/// Failures reported by the inventory client.
///
/// Business refusals (`ProductNotFound`, `StockReservationFailed`) are kept
/// apart from transport failures so callers can tell "the ledger said no"
/// from "the ledger could not be reached".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InventoryError {
    /// The request never produced a usable response.
    #[error("Inventory service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Product not found in inventory: {0}")]
    ProductNotFound(ProductId),

    /// The ledger refused the stock operation (409).
    #[error("Stock operation failed for product {product_id}: {reason}")]
    StockReservationFailed { product_id: ProductId, reason: String },

    /// Any other non-success status.
    #[error("Inventory service returned {status}: {body}")]
    ServiceError { status: u16, body: String },

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },
}

/// Errors raised by the billing application layer.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error(transparent)]
    Invoice(#[from] InvoiceError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// The invoice row changed between read and write.
    #[error("Concurrent modification of invoice {invoice_id}: expected version {expected}")]
    ConcurrentUpdate {
        invoice_id: InvoiceId,
        expected: Version,
    },

    /// The inventory reports fewer units than the line asks for.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl BillingError {
    /// Returns true if the caller may re-read the invoice and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingError::ConcurrentUpdate { .. })
    }
}

/// Result type for billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;
