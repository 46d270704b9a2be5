//! Stock ledger for the inventory service.
//!
//! Each product row tracks total stock, the part of it currently held by
//! reservations, and a version stamp. Reservations, confirmations and
//! cancellations are applied to a copy of the row and written back with a
//! compare-and-swap on the version that was read, so concurrent writers
//! never overwrite each other silently: the loser gets
//! [`LedgerError::ConcurrentUpdate`] and may re-read and retry.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod product;
pub mod service;
pub mod store;

pub use common::{Money, ProductId, Version};
pub use error::{LedgerError, Result};
pub use memory::InMemoryProductRepository;
pub use postgres::PostgresProductRepository;
pub use product::{NewProduct, Product};
pub use service::{FailureMode, LedgerConfig, LedgerOperation, StockLedger};
pub use store::ProductRepository;
