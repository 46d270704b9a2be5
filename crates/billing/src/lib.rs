//! Billing side of the invoice workflow.
//!
//! Holds the invoice aggregate and its storage, the client used to talk to
//! the inventory service, and the application service that builds invoices
//! up item by item. Finalizing an invoice is the saga crate's job.

pub mod client;
pub mod error;
pub mod invoice;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

pub use client::{
    HttpInventoryClient, InMemoryInventoryClient, InventoryCall, InventoryClient,
    InventoryClientConfig, InventoryOperation, ProductSnapshot,
};
pub use common::{InvoiceId, Money, ProductId, Version};
pub use error::{BillingError, InventoryError, InvoiceError, Result};
pub use invoice::{Invoice, InvoiceItem, InvoiceStatus};
pub use memory::InMemoryInvoiceRepository;
pub use postgres::PostgresInvoiceRepository;
pub use service::InvoiceService;
pub use store::InvoiceRepository;
