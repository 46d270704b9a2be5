use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{InventoryClient, InventoryOperation, ProductSnapshot, validate_quantity};
use crate::{InventoryError, Money, ProductId};

/// Connection settings for [`HttpInventoryClient`].
#[derive(Debug, Clone)]
pub struct InventoryClientConfig {
    /// Base URL of the inventory service, e.g. `http://inventory-service:8080`.
    pub base_url: String,
    /// Per-request timeout. `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

impl InventoryClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Serialize)]
struct QuantityRequest {
    quantity: i64,
}

#[derive(Deserialize)]
struct ProductResponse {
    id: i64,
    name: String,
    price: f64,
    stock: i64,
}

/// HTTP client for the inventory service.
///
/// Maps responses onto [`InventoryError`]: 404 is `ProductNotFound`, 409 is
/// `StockReservationFailed`, other non-2xx statuses are `ServiceError`, and
/// anything that fails before a status can be read (connection refused,
/// timeout, malformed body) is `ServiceUnavailable`.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
    /// Creates a client from its configuration.
    pub fn new(config: InventoryClientConfig) -> reqwest::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_quantity(
        &self,
        operation: InventoryOperation,
        path: &str,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), InventoryError> {
        validate_quantity(quantity)?;

        let url = format!("{}/products/{}/{}", self.base_url, product_id, path);
        tracing::debug!(%operation, %product_id, quantity, %url, "calling inventory service");

        let response = self
            .client
            .post(&url)
            .json(&QuantityRequest { quantity })
            .send()
            .await
            .map_err(|e| unavailable(operation, product_id, e))?;

        Self::check_status(operation, product_id, response).await?;
        Ok(())
    }

    async fn check_status(
        operation: InventoryOperation,
        product_id: ProductId,
        response: Response,
    ) -> Result<Response, InventoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%operation, %product_id, status = status.as_u16(), %body, "inventory call refused");

        Err(match status {
            StatusCode::NOT_FOUND => InventoryError::ProductNotFound(product_id),
            StatusCode::CONFLICT => InventoryError::StockReservationFailed {
                product_id,
                reason: body,
            },
            _ => InventoryError::ServiceError {
                status: status.as_u16(),
                body,
            },
        })
    }
}

fn unavailable(
    operation: InventoryOperation,
    product_id: ProductId,
    error: reqwest::Error,
) -> InventoryError {
    tracing::warn!(%operation, %product_id, error = %error, "inventory service unreachable");
    InventoryError::ServiceUnavailable(error.to_string())
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn get_product(&self, product_id: ProductId) -> Result<ProductSnapshot, InventoryError> {
        let operation = InventoryOperation::GetProduct;
        let url = format!("{}/products/{}", self.base_url, product_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(operation, product_id, e))?;
        let response = Self::check_status(operation, product_id, response).await?;

        let product: ProductResponse = response
            .json()
            .await
            .map_err(|e| unavailable(operation, product_id, e))?;

        let price = Money::try_from_decimal(product.price).ok_or_else(|| {
            InventoryError::ServiceError {
                status: 200,
                body: format!("price out of range: {}", product.price),
            }
        })?;

        Ok(ProductSnapshot {
            id: ProductId::new(product.id),
            name: product.name,
            price,
            stock: product.stock,
        })
    }

    async fn reserve_stock(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), InventoryError> {
        self.post_quantity(InventoryOperation::Reserve, "reserve-stock", product_id, quantity)
            .await
    }

    async fn confirm_stock(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), InventoryError> {
        self.post_quantity(InventoryOperation::Confirm, "confirm-stock", product_id, quantity)
            .await
    }

    async fn cancel_reservation(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<(), InventoryError> {
        self.post_quantity(InventoryOperation::Cancel, "cancel-reserve", product_id, quantity)
            .await
    }
}
