//! Run reports.

use billing::{InvoiceId, InvoiceStatus, ProductId};
use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

use crate::journal::InFlightCall;
use crate::state::{EntryState, SagaOutcome, SagaPhase};

/// One line of the saga's working set: a quantity held for a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationEntry {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// A working-set entry together with how far it has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingEntry {
    pub product_id: ProductId,
    pub quantity: i64,
    pub state: EntryState,
}

impl WorkingEntry {
    pub fn reserved(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            state: EntryState::Reserved,
        }
    }

    pub fn entry(&self) -> ReservationEntry {
        ReservationEntry {
            product_id: self.product_id,
            quantity: self.quantity,
        }
    }
}

/// A compensating cancel that was attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub product_id: ProductId,
    pub quantity: i64,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl CompensationRecord {
    pub fn from_result<E: std::fmt::Display>(
        product_id: ProductId,
        quantity: i64,
        result: &Result<(), E>,
    ) -> Self {
        Self {
            product_id,
            quantity,
            succeeded: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        }
    }
}

/// What one saga run did.
///
/// `reserved` lists every entry whose reservation went through, in
/// reservation order. `left_reserved` lists the entries still held at the
/// end of the run: neither confirmed nor released by a compensating cancel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaReport {
    pub saga_id: SagaId,
    pub invoice_id: InvoiceId,
    pub outcome: SagaOutcome,
    pub phase_reached: SagaPhase,
    pub reserved: Vec<ReservationEntry>,
    pub confirmed: Vec<ReservationEntry>,
    pub compensations: Vec<CompensationRecord>,
    pub left_reserved: Vec<ReservationEntry>,
    /// Status of the invoice after the run. Only a successful run closes it.
    pub invoice_status: InvoiceStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SagaReport {
    /// Returns true if every compensating cancel went through.
    pub fn compensations_succeeded(&self) -> bool {
        self.compensations.iter().all(|c| c.succeeded)
    }
}

/// Result of recovering one journaled run left behind by a crash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub saga_id: SagaId,
    pub invoice_id: InvoiceId,
    pub phase: SagaPhase,
    pub compensations: Vec<CompensationRecord>,
    /// The call that was in flight when the run stopped. Its effect on the
    /// inventory is unknown and needs an operator to look at it.
    pub unresolved: Option<InFlightCall>,
    /// A compensating cancel failed, so the entry stays in the journal with
    /// the cancelled lines marked and is swept again next time.
    pub retained: bool,
}
