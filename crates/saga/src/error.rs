//! Saga error types.

use billing::{BillingError, InventoryError, InvoiceError, InvoiceId};
use thiserror::Error;

use crate::report::SagaReport;

/// Failures of the saga journal.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt journal entry for invoice {invoice_id}: {reason}")]
    Corrupt { invoice_id: InvoiceId, reason: String },
}

/// The failure that made a saga run stop.
#[derive(Debug, Error)]
pub enum StepError {
    /// A remote stock operation failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// The invoice refused to close.
    #[error(transparent)]
    Invoice(#[from] InvoiceError),

    /// The closed invoice could not be stored.
    #[error("Failed to persist invoice: {0}")]
    Persistence(#[source] BillingError),

    /// The working set could not be journaled before a remote call.
    #[error("Failed to journal saga state: {0}")]
    Journal(#[source] JournalError),

    #[error("Saga cancelled by caller")]
    Cancelled,
}

/// Errors returned by the saga coordinator.
#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// The invoice was rejected before any remote call (e.g. already closed).
    #[error(transparent)]
    Invoice(#[from] InvoiceError),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Saga journal error: {0}")]
    Journal(#[from] JournalError),

    /// The run started and then failed. The report records how far it got
    /// and which compensations were attempted.
    #[error("Saga {} for invoice {}: {cause}", .report.outcome, .report.invoice_id)]
    Aborted {
        report: Box<SagaReport>,
        cause: StepError,
    },
}

impl SagaError {
    /// Returns the run report for failures that happened mid-run.
    pub fn report(&self) -> Option<&SagaReport> {
        match self {
            SagaError::Aborted { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
