//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use billing::{BillingError, InventoryError, InvoiceError};
use inventory::LedgerError;
use saga::{SagaError, SagaOutcome, SagaReport, StepError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Stock ledger error.
    Ledger(LedgerError),
    /// Invoice or inventory client error.
    Billing(BillingError),
    /// Saga execution error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Ledger(err) => (ledger_status(&err), err.to_string()),
            ApiError::Billing(err) => (billing_status(&err), err.to_string()),
            // A run that started answers with its report, not a bare message.
            ApiError::Saga(SagaError::Aborted { report, cause }) => {
                return aborted_response(*report, &cause);
            }
            ApiError::Saga(err) => (saga_status(&err), err.to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InvalidQuantity { .. }
        | LedgerError::NegativeStock { .. }
        | LedgerError::InvalidPrice { .. }
        | LedgerError::InvalidProduct(_) => StatusCode::BAD_REQUEST,
        LedgerError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InsufficientStock { .. }
        | LedgerError::InvalidStock { .. }
        | LedgerError::ConcurrentUpdate { .. } => StatusCode::CONFLICT,
        LedgerError::SimulatedFailure { .. }
        | LedgerError::Database(_)
        | LedgerError::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn invoice_status(err: &InvoiceError) -> StatusCode {
    match err {
        InvoiceError::AlreadyClosed(_) | InvoiceError::EmptyInvoice(_) => StatusCode::CONFLICT,
        InvoiceError::InvalidQuantity { .. }
        | InvoiceError::InvalidPrice { .. }
        | InvoiceError::TotalOverflow(_) => StatusCode::BAD_REQUEST,
    }
}

fn inventory_status(err: &InventoryError) -> StatusCode {
    match err {
        InventoryError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        InventoryError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
        InventoryError::StockReservationFailed { .. } => StatusCode::CONFLICT,
        InventoryError::ServiceError { .. } => StatusCode::BAD_GATEWAY,
        InventoryError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn billing_status(err: &BillingError) -> StatusCode {
    match err {
        BillingError::Invoice(e) => invoice_status(e),
        BillingError::Inventory(e) => inventory_status(e),
        BillingError::InvoiceNotFound(_) => StatusCode::NOT_FOUND,
        BillingError::ConcurrentUpdate { .. } | BillingError::InsufficientStock { .. } => {
            StatusCode::CONFLICT
        }
        BillingError::Database(_) | BillingError::Migration(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn saga_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::InvoiceNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::Invoice(e) => invoice_status(e),
        SagaError::Billing(e) => billing_status(e),
        SagaError::Journal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SagaError::Aborted { report, cause } => aborted_status(report, cause),
    }
}

/// Status of a run that started and then failed.
///
/// A refused reservation or an invoice that cannot be closed is the
/// caller's conflict; a cancelled run means the service gave up on it.
fn aborted_status(report: &SagaReport, cause: &StepError) -> StatusCode {
    match (report.outcome, cause) {
        (_, StepError::Invoice(InvoiceError::AlreadyClosed(_))) => StatusCode::CONFLICT,
        (SagaOutcome::FailedAtReservation, _) => StatusCode::CONFLICT,
        (SagaOutcome::Cancelled, _) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn aborted_response(report: SagaReport, cause: &StepError) -> Response {
    let status = aborted_status(&report, cause);
    tracing::warn!(
        invoice_id = %report.invoice_id,
        outcome = %report.outcome,
        status = status.as_u16(),
        error = %cause,
        "invoice finalization failed"
    );
    (status, Json(report)).into_response()
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        ApiError::Billing(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
