use thiserror::Error;

use crate::{ProductId, Version};

/// Errors that can occur when operating on the stock ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Quantity must be strictly positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Initial stock of a new product must not be negative.
    #[error("Invalid stock: {stock} (must not be negative)")]
    NegativeStock { stock: i64 },

    /// Price of a new product must not be negative.
    #[error("Invalid price: {cents} cents (must not be negative)")]
    InvalidPrice { cents: i64 },

    /// Product data failed validation.
    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    /// A reservation asked for more units than are available.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// A confirmation or cancellation exceeded the reserved quantity.
    #[error(
        "Invalid stock operation on product {product_id}: requested {requested}, reserved {reserved}"
    )]
    InvalidStock {
        product_id: ProductId,
        requested: i64,
        reserved: i64,
    },

    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The row changed between read and write.
    #[error("Concurrent modification of product {product_id}: expected version {expected}")]
    ConcurrentUpdate {
        product_id: ProductId,
        expected: Version,
    },

    /// Failure injected through [`crate::FailureMode`].
    #[error("Simulated failure in {operation}")]
    SimulatedFailure { operation: &'static str },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl LedgerError {
    /// Returns true if the caller may re-read the row and try again.
    ///
    /// Only a lost version race qualifies; business-rule failures are final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrentUpdate { .. })
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
