use async_trait::async_trait;

use crate::{NewProduct, Product, ProductId, Result, Version};

/// Storage for ledger rows.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Inserts a new product and returns it with its assigned ID.
    async fn create(&self, product: NewProduct) -> Result<Product>;

    /// Loads a product row. Returns None if it doesn't exist.
    async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists all products ordered by ID.
    async fn list(&self) -> Result<Vec<Product>>;

    /// Writes `product` only if the stored row is still at `expected_version`.
    ///
    /// This is an atomic compare-and-swap: when another writer got there
    /// first nothing is written and `ConcurrentUpdate` is returned.
    async fn update(&self, product: &Product, expected_version: Version) -> Result<()>;
}
