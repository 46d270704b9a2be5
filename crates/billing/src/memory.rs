use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{BillingError, Invoice, InvoiceId, Result, Version, store::InvoiceRepository};

#[derive(Default)]
struct InMemoryState {
    invoices: BTreeMap<InvoiceId, Invoice>,
    next_invoice_id: i64,
    next_item_id: i64,
}

/// In-memory invoice repository.
#[derive(Clone, Default)]
pub struct InMemoryInvoiceRepository {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryInvoiceRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored invoices.
    pub async fn invoice_count(&self) -> usize {
        self.state.read().await.invoices.len()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn create(&self, number: &str) -> Result<Invoice> {
        let mut state = self.state.write().await;
        state.next_invoice_id += 1;
        let id = InvoiceId::new(state.next_invoice_id);

        let invoice = Invoice::new(id, number, Utc::now());
        state.invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    async fn get_by_id(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.state.read().await.invoices.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Invoice>> {
        Ok(self.state.read().await.invoices.values().cloned().collect())
    }

    async fn update(&self, invoice: &Invoice, expected_version: Version) -> Result<Invoice> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let stored = state
            .invoices
            .get_mut(&invoice.id())
            .ok_or(BillingError::InvoiceNotFound(invoice.id()))?;

        if stored.version() != expected_version {
            return Err(BillingError::ConcurrentUpdate {
                invoice_id: invoice.id(),
                expected: expected_version,
            });
        }

        let mut updated = invoice.clone();
        for item in updated.items_mut() {
            if item.id.is_none() {
                state.next_item_id += 1;
                item.id = Some(state.next_item_id);
            }
        }

        *stored = updated.clone();
        Ok(updated)
    }
}
