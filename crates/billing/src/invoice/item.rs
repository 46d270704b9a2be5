use serde::{Deserialize, Serialize};

use crate::{Money, ProductId};

/// A line on an invoice.
///
/// `price` and `name` are snapshots taken when the line was added and are
/// never refreshed from the inventory afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    /// Assigned by the repository when the line is first persisted.
    pub id: Option<i64>,
    pub product_id: ProductId,
    pub quantity: i64,
    pub price: Money,
    pub name: String,
}

impl InvoiceItem {
    /// Returns `quantity × price`, or `None` if it does not fit in cents.
    pub fn line_total(&self) -> Option<Money> {
        self.price.checked_mul(self.quantity)
    }
}
