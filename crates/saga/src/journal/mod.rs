//! Durable record of in-progress saga runs.
//!
//! Before every remote call the coordinator upserts the run's phase, its
//! working set, and the call it is about to make. The row is removed when
//! the run ends, so anything still in the journal belongs to a run that
//! never finished and is picked up by [`crate::SagaCoordinator::recover`].

mod memory;
mod postgres;

use async_trait::async_trait;
use billing::{InvoiceId, ProductId};
use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

pub use memory::InMemorySagaJournal;
pub use postgres::PostgresSagaJournal;

use crate::error::JournalError;
use crate::report::WorkingEntry;
use crate::state::SagaPhase;

/// Remote stock operations a run can have in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockCall {
    Reserve,
    Confirm,
    Cancel,
}

/// The remote call a run was about to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightCall {
    pub call: StockCall,
    /// Position in the working set. For a reservation this is the index
    /// the new entry will take.
    pub index: usize,
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Journaled state of one run, keyed by invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub invoice_id: InvoiceId,
    pub saga_id: SagaId,
    pub phase: SagaPhase,
    pub entries: Vec<WorkingEntry>,
    pub in_flight: Option<InFlightCall>,
    pub updated_at: DateTime<Utc>,
}

/// Storage for [`JournalEntry`] rows.
#[async_trait]
pub trait SagaJournal: Send + Sync {
    /// Inserts or replaces the entry for `entry.invoice_id`.
    async fn record(&self, entry: &JournalEntry) -> Result<(), JournalError>;

    /// Removes the entry for an invoice. Removing a missing entry is not an
    /// error.
    async fn clear(&self, invoice_id: InvoiceId) -> Result<(), JournalError>;

    /// Returns every entry left in the journal, ordered by invoice.
    async fn pending(&self) -> Result<Vec<JournalEntry>, JournalError>;
}
