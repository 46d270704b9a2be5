use async_trait::async_trait;

use crate::{Invoice, InvoiceId, Result, Version};

/// Storage for invoices and their lines.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Creates an empty open invoice with a freshly assigned ID.
    async fn create(&self, number: &str) -> Result<Invoice>;

    /// Loads an invoice with its lines in insertion order.
    async fn get_by_id(&self, id: InvoiceId) -> Result<Option<Invoice>>;

    /// Lists all invoices ordered by ID.
    async fn list(&self) -> Result<Vec<Invoice>>;

    /// Writes `invoice` only if the stored row is still at
    /// `expected_version`, inserting lines that have no ID yet.
    ///
    /// Returns the stored invoice with every line ID filled in. A lost race
    /// writes nothing and fails with `ConcurrentUpdate`.
    async fn update(&self, invoice: &Invoice, expected_version: Version) -> Result<Invoice>;
}
