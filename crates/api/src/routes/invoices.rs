//! Invoice endpoints of the billing service.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use billing::{
    InventoryClient, Invoice, InvoiceId, InvoiceItem, InvoiceRepository, InvoiceService, ProductId,
};
use chrono::{DateTime, Utc};
use saga::{SagaCoordinator, SagaJournal, SagaReport};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;

/// Shared state of the billing service.
///
/// `shutdown` is the parent of every saga run's cancellation token.
pub struct BillingState<R, C, J>
where
    R: InvoiceRepository,
    C: InventoryClient,
    J: SagaJournal,
{
    pub invoices: InvoiceService<R, C>,
    pub saga: SagaCoordinator<R, C, J>,
    pub shutdown: CancellationToken,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateInvoiceRequest {
    pub number: String,
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: i64,
    pub quantity: i64,
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub id: i64,
    pub number: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub items: Vec<InvoiceItemResponse>,
    pub total_value: f64,
    pub version: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceItemResponse {
    pub id: Option<i64>,
    pub product_id: i64,
    pub quantity: i64,
    pub price: f64,
    pub name: String,
}

impl From<&InvoiceItem> for InvoiceItemResponse {
    fn from(item: &InvoiceItem) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id.as_i64(),
            quantity: item.quantity,
            price: item.price.as_decimal(),
            name: item.name.clone(),
        }
    }
}

impl From<&Invoice> for InvoiceResponse {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id().as_i64(),
            number: invoice.number().to_string(),
            status: invoice.status().to_string(),
            created_at: invoice.created_at(),
            closed_at: invoice.closed_at(),
            items: invoice.items().iter().map(InvoiceItemResponse::from).collect(),
            total_value: invoice.total_value().as_decimal(),
            version: invoice.version().as_i64(),
        }
    }
}

#[derive(Serialize)]
pub struct PrintResponse {
    pub message: &'static str,
    pub invoice: InvoiceResponse,
    pub process_info: SagaReport,
}

// -- Handlers --

/// POST /invoices: open a new, empty invoice.
#[tracing::instrument(skip(state, req), fields(number = %req.number))]
pub async fn create<R, C, J>(
    State(state): State<Arc<BillingState<R, C, J>>>,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), ApiError>
where
    R: InvoiceRepository + 'static,
    C: InventoryClient + 'static,
    J: SagaJournal + 'static,
{
    let invoice = state.invoices.create_invoice(&req.number).await?;
    Ok((StatusCode::CREATED, Json(InvoiceResponse::from(&invoice))))
}

/// GET /invoices: list every invoice.
#[tracing::instrument(skip(state))]
pub async fn list<R, C, J>(
    State(state): State<Arc<BillingState<R, C, J>>>,
) -> Result<Json<Vec<InvoiceResponse>>, ApiError>
where
    R: InvoiceRepository + 'static,
    C: InventoryClient + 'static,
    J: SagaJournal + 'static,
{
    let invoices = state.invoices.list_invoices().await?;
    Ok(Json(invoices.iter().map(InvoiceResponse::from).collect()))
}

/// GET /invoices/{id}: load one invoice with its items.
#[tracing::instrument(skip(state))]
pub async fn get<R, C, J>(
    State(state): State<Arc<BillingState<R, C, J>>>,
    Path(id): Path<i64>,
) -> Result<Json<InvoiceResponse>, ApiError>
where
    R: InvoiceRepository + 'static,
    C: InventoryClient + 'static,
    J: SagaJournal + 'static,
{
    let invoice = state.invoices.get_invoice(InvoiceId::new(id)).await?;
    Ok(Json(InvoiceResponse::from(&invoice)))
}

/// POST /invoices/{id}/items: add a line priced from the inventory.
#[tracing::instrument(skip(state, req), fields(product_id = req.product_id, quantity = req.quantity))]
pub async fn add_item<R, C, J>(
    State(state): State<Arc<BillingState<R, C, J>>>,
    Path(id): Path<i64>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<InvoiceResponse>, ApiError>
where
    R: InvoiceRepository + 'static,
    C: InventoryClient + 'static,
    J: SagaJournal + 'static,
{
    let invoice = state
        .invoices
        .add_item(
            InvoiceId::new(id),
            ProductId::new(req.product_id),
            req.quantity,
        )
        .await?;
    Ok(Json(InvoiceResponse::from(&invoice)))
}

/// POST /invoices/{id}/print: finalize the invoice through the saga.
///
/// The run executes on its own task with a child of the shutdown token. If
/// the client goes away the token is cancelled and the run compensates
/// instead of being dropped halfway through a remote call.
#[tracing::instrument(skip(state))]
pub async fn print<R, C, J>(
    State(state): State<Arc<BillingState<R, C, J>>>,
    Path(id): Path<i64>,
) -> Result<Json<PrintResponse>, ApiError>
where
    R: InvoiceRepository + 'static,
    C: InventoryClient + 'static,
    J: SagaJournal + 'static,
{
    let invoice_id = InvoiceId::new(id);
    let token = state.shutdown.child_token();
    let guard = token.clone().drop_guard();

    let run_state = Arc::clone(&state);
    let run = tokio::spawn(async move { run_state.saga.execute_saga(invoice_id, &token).await });
    let result = run
        .await
        .map_err(|e| ApiError::Internal(format!("saga task failed: {e}")))?;
    guard.disarm();

    let report = result?;
    let invoice = state.invoices.get_invoice(invoice_id).await?;

    Ok(Json(PrintResponse {
        message: "Invoice printed successfully",
        invoice: InvoiceResponse::from(&invoice),
        process_info: report,
    }))
}
