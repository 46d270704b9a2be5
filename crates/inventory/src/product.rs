//! Product ledger entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, Money, ProductId, Result, Version};

/// Validated input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    name: String,
    price: Money,
    stock: i64,
}

impl NewProduct {
    /// Validates the fields of a product that is about to be created.
    pub fn new(name: impl Into<String>, price: Money, stock: i64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LedgerError::InvalidProduct(
                "name must not be empty".to_string(),
            ));
        }
        if price.is_negative() {
            return Err(LedgerError::InvalidPrice {
                cents: price.cents(),
            });
        }
        if stock < 0 {
            return Err(LedgerError::NegativeStock { stock });
        }

        Ok(Self { name, price, stock })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    /// Builds the stored row once the repository has assigned an ID.
    pub(crate) fn into_product(self, id: ProductId, created_at: DateTime<Utc>) -> Product {
        Product {
            id,
            name: self.name,
            price: self.price,
            stock: self.stock,
            reserved_stock: 0,
            version: Version::first(),
            created_at,
        }
    }
}

/// A product row in the stock ledger.
///
/// `stock` is the number of units owned, `reserved_stock` the part of it held
/// by open reservations. `0 <= reserved_stock <= stock` holds after every
/// successful mutation, and each mutation bumps `version` by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    name: String,
    price: Money,
    stock: i64,
    reserved_stock: i64,
    version: Version,
    created_at: DateTime<Utc>,
}

// Query methods
impl Product {
    pub fn id(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }

    pub fn reserved_stock(&self) -> i64 {
        self.reserved_stock
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> i64 {
        self.stock - self.reserved_stock
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// Mutations. Each one validates first and leaves the row untouched on error.
impl Product {
    /// Holds `quantity` units against the available stock.
    pub fn reserve(&mut self, quantity: i64) -> Result<()> {
        validate_quantity(quantity)?;

        let available = self.available();
        if quantity > available {
            return Err(LedgerError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available,
            });
        }

        self.reserved_stock += quantity;
        self.version = self.version.next();
        Ok(())
    }

    /// Consumes `quantity` reserved units: they leave both the reservation
    /// and the total stock.
    pub fn confirm(&mut self, quantity: i64) -> Result<()> {
        validate_quantity(quantity)?;
        self.ensure_reserved(quantity)?;

        self.stock -= quantity;
        self.reserved_stock -= quantity;
        self.version = self.version.next();
        Ok(())
    }

    /// Releases `quantity` reserved units without touching the total stock.
    pub fn cancel(&mut self, quantity: i64) -> Result<()> {
        validate_quantity(quantity)?;
        self.ensure_reserved(quantity)?;

        self.reserved_stock -= quantity;
        self.version = self.version.next();
        Ok(())
    }

    fn ensure_reserved(&self, quantity: i64) -> Result<()> {
        if quantity > self.reserved_stock {
            return Err(LedgerError::InvalidStock {
                product_id: self.id,
                requested: quantity,
                reserved: self.reserved_stock,
            });
        }
        Ok(())
    }

    /// Rebuilds a row read back from storage.
    pub(crate) fn from_storage(
        id: ProductId,
        name: String,
        price: Money,
        stock: i64,
        reserved_stock: i64,
        version: Version,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            price,
            stock,
            reserved_stock,
            version,
            created_at,
        }
    }
}

/// Rejects zero and negative quantities.
pub fn validate_quantity(quantity: i64) -> Result<()> {
    if quantity <= 0 {
        return Err(LedgerError::InvalidQuantity { quantity });
    }
    Ok(())
}
