//! Stock ledger endpoints of the inventory service.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use inventory::{Money, Product, ProductId, ProductRepository, StockLedger};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared state of the inventory service.
pub struct InventoryState<R: ProductRepository> {
    pub ledger: StockLedger<R>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub price: f64,
    pub stock: i64,
}

#[derive(Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

// -- Response types --

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub stock: i64,
    pub reserved_stock: i64,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id().as_i64(),
            name: product.name().to_string(),
            price: product.price().as_decimal(),
            stock: product.stock(),
            reserved_stock: product.reserved_stock(),
            version: product.version().as_i64(),
            created_at: product.created_at(),
        }
    }
}

#[derive(Serialize)]
pub struct StockStatusResponse {
    pub status: &'static str,
}

// -- Handlers --

/// POST /products: register a product with its initial stock.
#[tracing::instrument(skip(state, req), fields(name = %req.name))]
pub async fn create<R: ProductRepository + 'static>(
    State(state): State<Arc<InventoryState<R>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let price = Money::try_from_decimal(req.price)
        .ok_or_else(|| ApiError::BadRequest("Invalid product data".to_string()))?;

    let product = state
        .ledger
        .create_product(req.name, price, req.stock)
        .await?;

    Ok((StatusCode::CREATED, Json(ProductResponse::from(&product))))
}

/// GET /products: list every product.
#[tracing::instrument(skip(state))]
pub async fn list<R: ProductRepository + 'static>(
    State(state): State<Arc<InventoryState<R>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.ledger.list_products().await?;
    Ok(Json(products.iter().map(ProductResponse::from).collect()))
}

/// GET /products/{id}: look up one product.
#[tracing::instrument(skip(state))]
pub async fn get<R: ProductRepository + 'static>(
    State(state): State<Arc<InventoryState<R>>>,
    Path(id): Path<i64>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state.ledger.get_product(ProductId::new(id)).await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// POST /products/{id}/reserve-stock: hold units against available stock.
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn reserve<R: ProductRepository + 'static>(
    State(state): State<Arc<InventoryState<R>>>,
    Path(id): Path<i64>,
    Json(req): Json<QuantityRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = state
        .ledger
        .reserve_stock(ProductId::new(id), req.quantity)
        .await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// POST /products/{id}/confirm-stock: consume reserved units.
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn confirm<R: ProductRepository + 'static>(
    State(state): State<Arc<InventoryState<R>>>,
    Path(id): Path<i64>,
    Json(req): Json<QuantityRequest>,
) -> Result<Json<StockStatusResponse>, ApiError> {
    state
        .ledger
        .confirm_reservation(ProductId::new(id), req.quantity)
        .await?;
    Ok(Json(StockStatusResponse {
        status: "confirmed",
    }))
}

/// POST /products/{id}/cancel-reserve: release reserved units.
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn cancel<R: ProductRepository + 'static>(
    State(state): State<Arc<InventoryState<R>>>,
    Path(id): Path<i64>,
    Json(req): Json<QuantityRequest>,
) -> Result<Json<StockStatusResponse>, ApiError> {
    state
        .ledger
        .cancel_reservation(ProductId::new(id), req.quantity)
        .await?;
    Ok(Json(StockStatusResponse {
        status: "reservation_canceled",
    }))
}
