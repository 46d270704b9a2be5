//! Invoice aggregate.

mod aggregate;
mod item;
mod state;

pub use aggregate::Invoice;
pub use item::InvoiceItem;
pub use state::{InvoiceStatus, UnknownStatus};
