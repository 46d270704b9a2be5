//! Invoice application service.

use crate::{
    BillingError, Invoice, InvoiceError, InvoiceId, ProductId, Result, client::InventoryClient,
    store::InvoiceRepository,
};

/// Builds invoices up line by line.
///
/// Adding a line only looks the product up to snapshot its name and price;
/// stock is reserved later, when the invoice is finalized.
pub struct InvoiceService<R: InvoiceRepository, C: InventoryClient> {
    repo: R,
    inventory: C,
}

impl<R: InvoiceRepository, C: InventoryClient> InvoiceService<R, C> {
    pub fn new(repo: R, inventory: C) -> Self {
        Self { repo, inventory }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn inventory(&self) -> &C {
        &self.inventory
    }

    /// Creates a new empty open invoice.
    #[tracing::instrument(skip(self))]
    pub async fn create_invoice(&self, number: &str) -> Result<Invoice> {
        let invoice = self.repo.create(number).await?;
        metrics::counter!("invoices_created_total").increment(1);
        tracing::info!(invoice_id = %invoice.id(), "invoice created");
        Ok(invoice)
    }

    /// Loads an invoice, failing if it does not exist.
    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(BillingError::InvoiceNotFound(id))
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        self.repo.list().await
    }

    /// Appends a line for `quantity` units of a product.
    ///
    /// The quantity is checked against the stock the inventory reports at
    /// this moment; that is advisory only, the reservation made at
    /// finalization is what actually holds the units.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        invoice_id: InvoiceId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<Invoice> {
        if quantity <= 0 {
            return Err(InvoiceError::InvalidQuantity { quantity }.into());
        }

        let mut invoice = self.get_invoice(invoice_id).await?;
        if invoice.is_closed() {
            return Err(InvoiceError::AlreadyClosed(invoice_id).into());
        }

        let product = self.inventory.get_product(product_id).await?;
        if quantity > product.stock {
            return Err(BillingError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.stock,
            });
        }

        let expected_version = invoice.version();
        invoice.add_item(product_id, quantity, product.price, product.name)?;
        let stored = self.repo.update(&invoice, expected_version).await?;

        tracing::info!(
            %invoice_id,
            %product_id,
            quantity,
            total_value = %stored.total_value(),
            "item added to invoice"
        );
        Ok(stored)
    }
}
