//! Saga coordinator for finalizing invoices.

use std::str::FromStr;

use billing::{
    InventoryClient, Invoice, InvoiceError, InvoiceId, InvoiceRepository, InvoiceStatus,
};
use chrono::{DateTime, Utc};
use common::SagaId;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SagaError, StepError};
use crate::journal::{InFlightCall, JournalEntry, SagaJournal, StockCall};
use crate::report::{
    CompensationRecord, RecoveryReport, ReservationEntry, SagaReport, WorkingEntry,
};
use crate::state::{EntryState, SagaOutcome, SagaPhase};

/// What to do with the entry whose confirmation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmFailurePolicy {
    /// Cancel the failed entry's reservation along with the other
    /// unconfirmed ones.
    #[default]
    CancelFailedItem,
    /// Leave the failed entry reserved. It shows up in the report's
    /// `left_reserved`.
    LeaveFailedItemReserved,
}

impl FromStr for ConfirmFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "cancel_failed_item" => Ok(ConfirmFailurePolicy::CancelFailedItem),
            "leave_failed_item_reserved" => Ok(ConfirmFailurePolicy::LeaveFailedItemReserved),
            other => Err(format!("unknown confirm failure policy: {other}")),
        }
    }
}

/// Coordinator configuration, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct SagaConfig {
    pub confirm_failure_policy: ConfirmFailurePolicy,
}

/// How a run stopped short of success.
struct Abort {
    outcome: SagaOutcome,
    cause: StepError,
}

impl Abort {
    fn new(outcome: SagaOutcome, cause: impl Into<StepError>) -> Self {
        Self {
            outcome,
            cause: cause.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(SagaOutcome::Cancelled, StepError::Cancelled)
    }
}

/// Mutable state of one run.
struct SagaRun {
    saga_id: SagaId,
    invoice_id: InvoiceId,
    started_at: DateTime<Utc>,
    phase: SagaPhase,
    entries: Vec<WorkingEntry>,
    compensations: Vec<CompensationRecord>,
}

impl SagaRun {
    fn new(invoice_id: InvoiceId) -> Self {
        Self {
            saga_id: SagaId::new(),
            invoice_id,
            started_at: Utc::now(),
            phase: SagaPhase::Started,
            entries: Vec::new(),
            compensations: Vec::new(),
        }
    }

    fn journal_entry(&self, in_flight: Option<InFlightCall>) -> JournalEntry {
        JournalEntry {
            invoice_id: self.invoice_id,
            saga_id: self.saga_id,
            phase: self.phase,
            entries: self.entries.clone(),
            in_flight,
            updated_at: Utc::now(),
        }
    }

    fn in_state(&self, state: EntryState) -> Vec<ReservationEntry> {
        self.entries
            .iter()
            .filter(|e| e.state == state)
            .map(WorkingEntry::entry)
            .collect()
    }

    fn into_report(
        self,
        outcome: SagaOutcome,
        invoice_status: InvoiceStatus,
        error: Option<String>,
    ) -> SagaReport {
        SagaReport {
            saga_id: self.saga_id,
            invoice_id: self.invoice_id,
            outcome,
            phase_reached: self.phase,
            reserved: self.entries.iter().map(WorkingEntry::entry).collect(),
            confirmed: self.in_state(EntryState::Confirmed),
            left_reserved: self.in_state(EntryState::Reserved),
            compensations: self.compensations,
            invoice_status,
            error,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Orchestrates invoice finalization.
///
/// The run reserves every line, confirms every reservation, then closes the
/// invoice. A failure before the close triggers compensating cancels for
/// the reservations that are still held; compensations are best-effort and
/// their results are recorded, never retried. The invoice is only closed
/// on full success.
pub struct SagaCoordinator<R, C, J>
where
    R: InvoiceRepository,
    C: InventoryClient,
    J: SagaJournal,
{
    invoices: R,
    inventory: C,
    journal: J,
    config: SagaConfig,
}

impl<R, C, J> SagaCoordinator<R, C, J>
where
    R: InvoiceRepository,
    C: InventoryClient,
    J: SagaJournal,
{
    /// Creates a new saga coordinator.
    pub fn new(invoices: R, inventory: C, journal: J, config: SagaConfig) -> Self {
        Self {
            invoices,
            inventory,
            journal,
            config,
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Finalizes an invoice.
    ///
    /// Fails with [`SagaError::InvoiceNotFound`] or
    /// [`InvoiceError::AlreadyClosed`] before any remote call. Once the run
    /// has started, every failure comes back as [`SagaError::Aborted`]
    /// carrying the run report.
    ///
    /// `cancel` is checked before each reservation and confirmation and
    /// between the two phases. A cancelled run compensates like a failed
    /// one. After the last confirmation the run is committed and ignores
    /// cancellation.
    #[tracing::instrument(skip(self, cancel), fields(saga_type = "InvoiceFinalization"))]
    pub async fn execute_saga(
        &self,
        invoice_id: InvoiceId,
        cancel: &CancellationToken,
    ) -> Result<SagaReport> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = std::time::Instant::now();

        let invoice = self
            .invoices
            .get_by_id(invoice_id)
            .await?
            .ok_or(SagaError::InvoiceNotFound(invoice_id))?;
        if invoice.is_closed() {
            return Err(InvoiceError::AlreadyClosed(invoice_id).into());
        }

        let mut run = SagaRun::new(invoice_id);
        tracing::info!(saga_id = %run.saga_id, items = invoice.items().len(), "saga started");

        let result = self.run_phases(&mut run, invoice, cancel).await;

        if let Err(e) = self.journal.clear(invoice_id).await {
            tracing::warn!(saga_id = %run.saga_id, error = %e, "failed to clear saga journal");
        }

        let duration = saga_start.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);

        match result {
            Ok(closed) => {
                let report = run.into_report(SagaOutcome::Success, closed.status(), None);
                metrics::counter!("saga_completed").increment(1);
                tracing::info!(saga_id = %report.saga_id, duration, "saga completed successfully");
                Ok(report)
            }
            Err(Abort { outcome, cause }) => {
                let report =
                    run.into_report(outcome, InvoiceStatus::Open, Some(cause.to_string()));
                metrics::counter!("saga_failed", "outcome" => outcome.as_str()).increment(1);
                tracing::warn!(
                    saga_id = %report.saga_id,
                    %outcome,
                    phase = %report.phase_reached,
                    left_reserved = report.left_reserved.len(),
                    error = %cause,
                    "saga failed"
                );
                Err(SagaError::Aborted {
                    report: Box::new(report),
                    cause,
                })
            }
        }
    }

    async fn run_phases(
        &self,
        run: &mut SagaRun,
        invoice: Invoice,
        cancel: &CancellationToken,
    ) -> std::result::Result<Invoice, Abort> {
        self.reserve_all(run, &invoice, cancel).await?;

        if cancel.is_cancelled() {
            self.compensate(run, None).await;
            return Err(Abort::cancelled());
        }

        self.confirm_all(run, cancel).await?;
        self.close(run, invoice).await
    }

    /// Reserves every line in stored order.
    async fn reserve_all(
        &self,
        run: &mut SagaRun,
        invoice: &Invoice,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), Abort> {
        run.phase = SagaPhase::Reserving;

        for item in invoice.items() {
            if cancel.is_cancelled() {
                self.compensate(run, None).await;
                return Err(Abort::cancelled());
            }

            let call = InFlightCall {
                call: StockCall::Reserve,
                index: run.entries.len(),
                product_id: item.product_id,
                quantity: item.quantity,
            };
            if let Err(e) = self.journal.record(&run.journal_entry(Some(call))).await {
                self.compensate(run, None).await;
                return Err(Abort::new(
                    SagaOutcome::FailedAtReservation,
                    StepError::Journal(e),
                ));
            }

            match self
                .inventory
                .reserve_stock(item.product_id, item.quantity)
                .await
            {
                Ok(()) => {
                    tracing::debug!(product_id = %item.product_id, quantity = item.quantity, "stock reserved");
                    run.entries
                        .push(WorkingEntry::reserved(item.product_id, item.quantity));
                }
                Err(e) => {
                    tracing::warn!(product_id = %item.product_id, quantity = item.quantity, error = %e, "reservation failed");
                    self.compensate(run, None).await;
                    return Err(Abort::new(SagaOutcome::FailedAtReservation, e));
                }
            }
        }

        Ok(())
    }

    /// Confirms every reservation in working-set order.
    async fn confirm_all(
        &self,
        run: &mut SagaRun,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), Abort> {
        run.phase = SagaPhase::Confirming;

        for index in 0..run.entries.len() {
            if cancel.is_cancelled() {
                self.compensate(run, None).await;
                return Err(Abort::cancelled());
            }

            let WorkingEntry {
                product_id,
                quantity,
                ..
            } = run.entries[index];

            let call = InFlightCall {
                call: StockCall::Confirm,
                index,
                product_id,
                quantity,
            };
            if let Err(e) = self.journal.record(&run.journal_entry(Some(call))).await {
                self.compensate(run, None).await;
                return Err(Abort::new(
                    SagaOutcome::FailedAtConfirmation,
                    StepError::Journal(e),
                ));
            }

            match self.inventory.confirm_stock(product_id, quantity).await {
                Ok(()) => {
                    tracing::debug!(%product_id, quantity, "reservation confirmed");
                    run.entries[index].state = EntryState::Confirmed;
                }
                Err(e) => {
                    tracing::warn!(%product_id, quantity, error = %e, "confirmation failed");
                    let keep = match self.config.confirm_failure_policy {
                        ConfirmFailurePolicy::CancelFailedItem => None,
                        ConfirmFailurePolicy::LeaveFailedItemReserved => Some(index),
                    };
                    self.compensate(run, keep).await;
                    return Err(Abort::new(SagaOutcome::FailedAtConfirmation, e));
                }
            }
        }

        Ok(())
    }

    /// Closes and stores the invoice. Confirmed stock is not given back if
    /// this fails.
    async fn close(
        &self,
        run: &mut SagaRun,
        mut invoice: Invoice,
    ) -> std::result::Result<Invoice, Abort> {
        run.phase = SagaPhase::Closing;

        let expected_version = invoice.version();
        invoice
            .close(Utc::now())
            .map_err(|e| Abort::new(SagaOutcome::FailedAtClose, e))?;

        let stored = self
            .invoices
            .update(&invoice, expected_version)
            .await
            .map_err(|e| Abort::new(SagaOutcome::FailedAtClose, StepError::Persistence(e)))?;

        run.phase = SagaPhase::Completed;
        Ok(stored)
    }

    /// Cancels every entry that is still only reserved, newest first,
    /// except `keep`.
    ///
    /// Failures are recorded and logged but do not stop the remaining
    /// cancels.
    #[tracing::instrument(skip(self, run), fields(saga_id = %run.saga_id))]
    async fn compensate(&self, run: &mut SagaRun, keep: Option<usize>) {
        for index in (0..run.entries.len()).rev() {
            if Some(index) == keep || run.entries[index].state != EntryState::Reserved {
                continue;
            }
            let WorkingEntry {
                product_id,
                quantity,
                ..
            } = run.entries[index];

            let call = InFlightCall {
                call: StockCall::Cancel,
                index,
                product_id,
                quantity,
            };
            if let Err(e) = self.journal.record(&run.journal_entry(Some(call))).await {
                tracing::warn!(%product_id, error = %e, "failed to journal compensation");
            }

            let result = self
                .inventory
                .cancel_reservation(product_id, quantity)
                .await;
            match &result {
                Ok(()) => {
                    run.entries[index].state = EntryState::Cancelled;
                    metrics::counter!("saga_compensations_total", "result" => "succeeded")
                        .increment(1);
                    tracing::info!(%product_id, quantity, "reservation cancelled");
                }
                Err(e) => {
                    metrics::counter!("saga_compensations_total", "result" => "failed")
                        .increment(1);
                    tracing::error!(%product_id, quantity, error = %e, "compensating cancel failed");
                }
            }
            run.compensations
                .push(CompensationRecord::from_result(product_id, quantity, &result));
        }
    }

    /// Sweeps runs left in the journal by a crash.
    ///
    /// Cancels every journaled reservation that was neither confirmed nor
    /// already cancelled. The call that was in flight is skipped and
    /// reported as unresolved since its effect is unknown. An entry is
    /// removed from the journal only when all of its cancels went through;
    /// otherwise it is re-recorded with the cancelled lines marked and
    /// picked up by the next sweep.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<Vec<RecoveryReport>> {
        let pending = self.journal.pending().await?;
        let mut reports = Vec::with_capacity(pending.len());

        for mut entry in pending {
            let unresolved_index = entry.in_flight.map(|call| call.index);
            let mut compensations = Vec::new();

            for index in (0..entry.entries.len()).rev() {
                let working = entry.entries[index];
                if working.state != EntryState::Reserved || Some(index) == unresolved_index {
                    continue;
                }
                let result = self
                    .inventory
                    .cancel_reservation(working.product_id, working.quantity)
                    .await;
                if result.is_ok() {
                    entry.entries[index].state = EntryState::Cancelled;
                }
                compensations.push(CompensationRecord::from_result(
                    working.product_id,
                    working.quantity,
                    &result,
                ));
            }

            let retained = !compensations.iter().all(|c| c.succeeded);
            if retained {
                entry.updated_at = Utc::now();
                self.journal.record(&entry).await?;
                tracing::error!(
                    saga_id = %entry.saga_id,
                    invoice_id = %entry.invoice_id,
                    failed = compensations.iter().filter(|c| !c.succeeded).count(),
                    "recovery left reservations held, keeping journal entry"
                );
            } else {
                self.journal.clear(entry.invoice_id).await?;
            }

            if let Some(call) = entry.in_flight {
                tracing::warn!(
                    saga_id = %entry.saga_id,
                    invoice_id = %entry.invoice_id,
                    product_id = %call.product_id,
                    quantity = call.quantity,
                    call = ?call.call,
                    "in-flight stock call left unresolved"
                );
            }
            tracing::info!(
                saga_id = %entry.saga_id,
                invoice_id = %entry.invoice_id,
                cancelled = compensations.iter().filter(|c| c.succeeded).count(),
                retained,
                "recovered interrupted saga"
            );

            reports.push(RecoveryReport {
                saga_id: entry.saga_id,
                invoice_id: entry.invoice_id,
                phase: entry.phase,
                compensations,
                unresolved: entry.in_flight,
                retained,
            });
        }

        Ok(reports)
    }
}
