use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    LedgerError, NewProduct, Product, ProductId, Result, Version, store::ProductRepository,
};

#[derive(Default)]
struct InMemoryState {
    products: BTreeMap<ProductId, Product>,
    next_id: i64,
}

/// In-memory product repository.
///
/// The version check and the write happen under one write lock, giving the
/// same compare-and-swap semantics as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryProductRepository {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryProductRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored products.
    pub async fn product_count(&self) -> usize {
        self.state.read().await.products.len()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn create(&self, product: NewProduct) -> Result<Product> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = ProductId::new(state.next_id);

        let product = product.into_product(id, Utc::now());
        state.products.insert(id, product.clone());
        Ok(product)
    }

    async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Product>> {
        Ok(self.state.read().await.products.values().cloned().collect())
    }

    async fn update(&self, product: &Product, expected_version: Version) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .products
            .get_mut(&product.id())
            .ok_or(LedgerError::ProductNotFound(product.id()))?;

        if stored.version() != expected_version {
            return Err(LedgerError::ConcurrentUpdate {
                product_id: product.id(),
                expected: expected_version,
            });
        }

        *stored = product.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Money;

    async fn seeded(stock: i64) -> (InMemoryProductRepository, Product) {
        let repo = InMemoryProductRepository::new();
        let product = repo
            .create(NewProduct::new("Widget", Money::from_cents(500), stock).unwrap())
            .await
            .unwrap();
        (repo, product)
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let repo = InMemoryProductRepository::new();
        let a = repo
            .create(NewProduct::new("A", Money::from_cents(100), 1).unwrap())
            .await
            .unwrap();
        let b = repo
            .create(NewProduct::new("B", Money::from_cents(100), 1).unwrap())
            .await
            .unwrap();

        assert_eq!(a.id(), ProductId::new(1));
        assert_eq!(b.id(), ProductId::new(2));
        assert_eq!(repo.product_count().await, 2);

        let listed: Vec<_> = repo.list().await.unwrap().iter().map(Product::id).collect();
        assert_eq!(listed, vec![a.id(), b.id()]);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = InMemoryProductRepository::new();
        assert!(repo.get_by_id(ProductId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_with_matching_version() {
        let (repo, mut product) = seeded(10).await;
        let expected = product.version();
        product.reserve(3).unwrap();

        repo.update(&product, expected).await.unwrap();

        let stored = repo.get_by_id(product.id()).await.unwrap().unwrap();
        assert_eq!(stored.reserved_stock(), 3);
        assert_eq!(stored.version(), Version::new(2));
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected_and_winner_survives() {
        let (repo, product) = seeded(10).await;

        let mut first = product.clone();
        let mut second = product.clone();
        first.reserve(4).unwrap();
        second.reserve(5).unwrap();

        repo.update(&first, product.version()).await.unwrap();
        let err = repo.update(&second, product.version()).await.unwrap_err();
        assert!(matches!(err, LedgerError::ConcurrentUpdate { .. }));

        let stored = repo.get_by_id(product.id()).await.unwrap().unwrap();
        assert_eq!(stored.reserved_stock(), 4);
        assert_eq!(stored.version(), Version::new(2));
    }

    #[tokio::test]
    async fn test_update_missing_product() {
        let (_, product) = seeded(1).await;
        let empty = InMemoryProductRepository::new();

        let err = empty.update(&product, product.version()).await.unwrap_err();
        assert!(matches!(err, LedgerError::ProductNotFound(_)));
    }
}
