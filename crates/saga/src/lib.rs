//! Saga pattern implementation for invoice finalization.
//!
//! Finalizing an invoice touches two independently owned resources, the
//! invoice and the remote stock ledger, with no shared transaction. The
//! saga runs in three phases:
//! 1. Reserve stock for every line
//! 2. Confirm every reservation
//! 3. Close the invoice
//!
//! If reservation or confirmation fails, the reservations still held are
//! cancelled as compensation. Progress is journaled before each remote call
//! so runs interrupted by a crash can be swept up by a recovery pass.

pub mod coordinator;
pub mod error;
pub mod journal;
pub mod report;
pub mod state;

pub use coordinator::{ConfirmFailurePolicy, SagaConfig, SagaCoordinator};
pub use error::{JournalError, Result, SagaError, StepError};
pub use journal::{
    InFlightCall, InMemorySagaJournal, JournalEntry, PostgresSagaJournal, SagaJournal, StockCall,
};
pub use report::{CompensationRecord, RecoveryReport, ReservationEntry, SagaReport, WorkingEntry};
pub use state::{EntryState, SagaOutcome, SagaPhase};
pub use tokio_util::sync::CancellationToken;
