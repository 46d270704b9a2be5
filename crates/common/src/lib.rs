//! Shared types used by the inventory ledger, the billing service and the
//! finalize-invoice saga.

pub mod money;
pub mod types;
pub mod version;

pub use money::Money;
pub use types::{InvoiceId, ProductId, SagaId};
pub use version::Version;
