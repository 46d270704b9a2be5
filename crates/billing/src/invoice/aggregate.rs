use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{InvoiceItem, InvoiceStatus};
use crate::{InvoiceError, InvoiceId, Money, ProductId, Version};

/// An invoice and its lines.
///
/// The aggregate knows nothing about stock. It enforces the line rules, keeps
/// `total_value` equal to the sum of the line totals, and owns the one-way
/// Open → Closed transition. Every successful mutation bumps `version`,
/// which the repository uses as a compare-and-swap stamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    number: String,
    status: InvoiceStatus,
    created_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    items: Vec<InvoiceItem>,
    total_value: Money,
    version: Version,
}

// Query methods
impl Invoice {
    pub fn id(&self) -> InvoiceId {
        self.id
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn is_closed(&self) -> bool {
        self.status == InvoiceStatus::Closed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    /// Lines in the order they were added.
    pub fn items(&self) -> &[InvoiceItem] {
        &self.items
    }

    pub fn total_value(&self) -> Money {
        self.total_value
    }

    pub fn version(&self) -> Version {
        self.version
    }
}

// Mutations
impl Invoice {
    /// Creates a new open invoice with no lines.
    pub fn new(id: InvoiceId, number: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            number: number.into(),
            status: InvoiceStatus::Open,
            created_at,
            closed_at: None,
            items: Vec::new(),
            total_value: Money::zero(),
            version: Version::first(),
        }
    }

    /// Appends a line and recomputes the total.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        quantity: i64,
        price: Money,
        name: impl Into<String>,
    ) -> Result<&InvoiceItem, InvoiceError> {
        if !self.status.can_modify_items() {
            return Err(InvoiceError::AlreadyClosed(self.id));
        }
        if quantity <= 0 {
            return Err(InvoiceError::InvalidQuantity { quantity });
        }
        if price.is_negative() {
            return Err(InvoiceError::InvalidPrice {
                cents: price.cents(),
            });
        }

        let item = InvoiceItem {
            id: None,
            product_id,
            quantity,
            price,
            name: name.into(),
        };
        let total = item
            .line_total()
            .and_then(|line| self.total_value.checked_add(line))
            .ok_or(InvoiceError::TotalOverflow(self.id))?;

        self.items.push(item);
        self.total_value = total;
        self.version = self.version.next();

        let index = self.items.len() - 1;
        Ok(&self.items[index])
    }

    /// Closes the invoice.
    ///
    /// Fails without touching `closed_at` or `total_value` when the invoice
    /// is already closed or has no lines.
    pub fn close(&mut self, now: DateTime<Utc>) -> Result<(), InvoiceError> {
        if self.is_closed() {
            return Err(InvoiceError::AlreadyClosed(self.id));
        }
        if self.items.is_empty() {
            return Err(InvoiceError::EmptyInvoice(self.id));
        }

        self.status = InvoiceStatus::Closed;
        self.closed_at = Some(now);
        self.version = self.version.next();
        Ok(())
    }

    /// Rebuilds an invoice read back from storage. The total is derived from
    /// the lines rather than trusted from the row.
    pub(crate) fn from_storage(
        id: InvoiceId,
        number: String,
        status: InvoiceStatus,
        created_at: DateTime<Utc>,
        closed_at: Option<DateTime<Utc>>,
        items: Vec<InvoiceItem>,
        version: Version,
    ) -> Result<Self, InvoiceError> {
        let total_value = items
            .iter()
            .try_fold(Money::zero(), |total, item| {
                item.line_total().and_then(|line| total.checked_add(line))
            })
            .ok_or(InvoiceError::TotalOverflow(id))?;

        Ok(Self {
            id,
            number,
            status,
            created_at,
            closed_at,
            items,
            total_value,
            version,
        })
    }

    /// Mutable access to the lines so the repository can record the IDs it
    /// assigned.
    pub(crate) fn items_mut(&mut self) -> &mut [InvoiceItem] {
        &mut self.items
    }
}
