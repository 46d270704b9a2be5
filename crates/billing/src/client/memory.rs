use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{InventoryClient, InventoryOperation, ProductSnapshot, validate_quantity};
use crate::{InventoryError, Money, ProductId};

/// A call received by [`InMemoryInventoryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryCall {
    pub operation: InventoryOperation,
    pub product_id: ProductId,
    /// Zero for lookups.
    pub quantity: i64,
}

#[derive(Debug, Clone)]
struct FakeProduct {
    name: String,
    price: Money,
    stock: i64,
    reserved: i64,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    operation: InventoryOperation,
    product_id: Option<ProductId>,
    error: InventoryError,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    products: BTreeMap<ProductId, FakeProduct>,
    calls: Vec<InventoryCall>,
    failures: Vec<InjectedFailure>,
}

/// In-memory inventory for tests.
///
/// Tracks stock and reservations with the same rules as the ledger, records
/// every call it receives, and can be told to fail chosen operations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryClient {
    state: Arc<Mutex<InMemoryInventoryState>>,
}

impl InMemoryInventoryClient {
    /// Creates an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryInventoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a product.
    pub fn add_product(&self, id: ProductId, name: &str, price: Money, stock: i64) {
        self.state().products.insert(
            id,
            FakeProduct {
                name: name.to_string(),
                price,
                stock,
                reserved: 0,
            },
        );
    }

    /// Returns `(stock, reserved)` for a product.
    pub fn stock_of(&self, id: ProductId) -> Option<(i64, i64)> {
        self.state()
            .products
            .get(&id)
            .map(|p| (p.stock, p.reserved))
    }

    /// Makes every later `operation` call fail with `error`, for one product
    /// or, with `None`, for all of them.
    pub fn fail_on(
        &self,
        operation: InventoryOperation,
        product_id: Option<ProductId>,
        error: InventoryError,
    ) {
        self.state().failures.push(InjectedFailure {
            operation,
            product_id,
            error,
        });
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Returns every call received so far, in order.
    pub fn calls(&self) -> Vec<InventoryCall> {
        self.state().calls.clone()
    }

    /// Returns the calls of one kind, in order.
    pub fn calls_for(&self, operation: InventoryOperation) -> Vec<InventoryCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    fn apply(
        &self,
        operation: InventoryOperation,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), InventoryError> {
        validate_quantity(quantity)?;

        let mut state = self.state();
        state.calls.push(InventoryCall {
            operation,
            product_id,
            quantity,
        });
        if let Some(error) = injected(&state, operation, product_id) {
            return Err(error);
        }

        let product = state
            .products
            .get_mut(&product_id)
            .ok_or(InventoryError::ProductNotFound(product_id))?;

        let refused = |reason: String| InventoryError::StockReservationFailed { product_id, reason };
        match operation {
            InventoryOperation::Reserve => {
                let available = product.stock - product.reserved;
                if quantity > available {
                    return Err(refused(format!(
                        "insufficient stock: requested {quantity}, available {available}"
                    )));
                }
                product.reserved += quantity;
            }
            InventoryOperation::Confirm => {
                if quantity > product.reserved {
                    return Err(refused(format!(
                        "requested {quantity}, reserved {}",
                        product.reserved
                    )));
                }
                product.stock -= quantity;
                product.reserved -= quantity;
            }
            InventoryOperation::Cancel => {
                if quantity > product.reserved {
                    return Err(refused(format!(
                        "requested {quantity}, reserved {}",
                        product.reserved
                    )));
                }
                product.reserved -= quantity;
            }
            InventoryOperation::GetProduct => {}
        }
        Ok(())
    }
}

fn injected(
    state: &InMemoryInventoryState,
    operation: InventoryOperation,
    product_id: ProductId,
) -> Option<InventoryError> {
    state
        .failures
        .iter()
        .find(|f| f.operation == operation && f.product_id.is_none_or(|id| id == product_id))
        .map(|f| f.error.clone())
}

#[async_trait]
impl InventoryClient for InMemoryInventoryClient {
    async fn get_product(&self, product_id: ProductId) -> Result<ProductSnapshot, InventoryError> {
        let operation = InventoryOperation::GetProduct;
        let mut state = self.state();
        state.calls.push(InventoryCall {
            operation,
            product_id,
            quantity: 0,
        });
        if let Some(error) = injected(&state, operation, product_id) {
            return Err(error);
        }

        state
            .products
            .get(&product_id)
            .map(|p| ProductSnapshot {
                id: product_id,
                name: p.name.clone(),
                price: p.price,
                stock: p.stock,
            })
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    async fn reserve_stock(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), InventoryError> {
        self.apply(InventoryOperation::Reserve, product_id, quantity)
    }

    async fn confirm_stock(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), InventoryError> {
        self.apply(InventoryOperation::Confirm, product_id, quantity)
    }

    async fn cancel_reservation(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), InventoryError> {
        self.apply(InventoryOperation::Cancel, product_id, quantity)
    }
}
