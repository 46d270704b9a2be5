//! Client for the inventory service.
//!
//! The saga and the invoice service only see the [`InventoryClient`] trait.
//! [`HttpInventoryClient`] talks to a running inventory service;
//! [`InMemoryInventoryClient`] is a fake that tracks stock itself.

mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::{HttpInventoryClient, InventoryClientConfig};
pub use memory::{InMemoryInventoryClient, InventoryCall};

use crate::{InventoryError, Money, ProductId};

/// What the inventory reports about a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

/// Operations the client can perform against the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryOperation {
    GetProduct,
    Reserve,
    Confirm,
    Cancel,
}

impl InventoryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryOperation::GetProduct => "get_product",
            InventoryOperation::Reserve => "reserve",
            InventoryOperation::Confirm => "confirm",
            InventoryOperation::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for InventoryOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Remote stock operations used by billing.
///
/// Each call is a single attempt. Implementations never retry.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Looks up a product's name, price and stock.
    async fn get_product(&self, product_id: ProductId) -> Result<ProductSnapshot, InventoryError>;

    /// Holds `quantity` units of a product.
    async fn reserve_stock(&self, product_id: ProductId, quantity: i64)
    -> Result<(), InventoryError>;

    /// Consumes `quantity` previously reserved units.
    async fn confirm_stock(&self, product_id: ProductId, quantity: i64)
    -> Result<(), InventoryError>;

    /// Releases `quantity` previously reserved units.
    async fn cancel_reservation(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), InventoryError>;
}

pub(crate) fn validate_quantity(quantity: i64) -> Result<(), InventoryError> {
    if quantity <= 0 {
        return Err(InventoryError::InvalidQuantity { quantity });
    }
    Ok(())
}
