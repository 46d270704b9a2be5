//! Integration tests for the inventory and billing services.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use billing::{
    HttpInventoryClient, InMemoryInventoryClient, InMemoryInvoiceRepository, InventoryClient,
    InventoryClientConfig, InventoryError, InventoryOperation, Money, ProductId,
};
use inventory::{
    FailureMode, InMemoryProductRepository, LedgerConfig, ProductRepository, StockLedger,
};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{InMemorySagaJournal, SagaConfig};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

// -- Inventory service --

fn inventory_app(
    failure_mode: FailureMode,
) -> (
    Router,
    Arc<api::routes::products::InventoryState<InMemoryProductRepository>>,
) {
    let state =
        api::create_inventory_state(InMemoryProductRepository::new(), LedgerConfig { failure_mode });
    let app = api::create_inventory_app(state.clone(), get_metrics_handle());
    (app, state)
}

async fn create_product(app: &Router, name: &str, price: f64, stock: i64) -> i64 {
    let (status, body) = send(
        app,
        "POST",
        "/products",
        Some(json!({"name": name, "price": price, "stock": stock})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = inventory_app(FailureMode::None);

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "inventory-service");
}

#[tokio::test]
async fn test_create_and_get_product() {
    let (app, _) = inventory_app(FailureMode::None);
    let id = create_product(&app, "Widget", 5.25, 10).await;

    let (status, body) = send(&app, "GET", &format!("/products/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Widget");
    assert_eq!(body["price"], 5.25);
    assert_eq!(body["stock"], 10);
    assert_eq!(body["reserved_stock"], 0);
    assert_eq!(body["version"], 1);

    let (status, body) = send(&app, "GET", "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_product_is_rejected() {
    let (app, _) = inventory_app(FailureMode::None);

    let (status, body) = send(
        &app,
        "POST",
        "/products",
        Some(json!({"name": "Widget", "price": 1.0, "stock": -1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("stock"));

    let (status, _) = send(
        &app,
        "POST",
        "/products",
        Some(json!({"name": "", "price": 1.0, "stock": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_price_beyond_cent_range_is_rejected() {
    let (app, _) = inventory_app(FailureMode::None);

    let (status, body) = send(
        &app,
        "POST",
        "/products",
        Some(json!({"name": "Yacht", "price": 1e17, "stock": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid product data");

    let (_, body) = send(&app, "GET", "/products", None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let (app, _) = inventory_app(FailureMode::None);

    let (status, body) = send(&app, "GET", "/products/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());

    let (status, _) = send(
        &app,
        "POST",
        "/products/99/reserve-stock",
        Some(json!({"quantity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reserve_then_confirm_over_http() {
    let (app, _) = inventory_app(FailureMode::None);
    let id = create_product(&app, "Widget", 1.0, 10).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/products/{id}/reserve-stock"),
        Some(json!({"quantity": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stock"], 10);
    assert_eq!(body["reserved_stock"], 7);
    assert_eq!(body["version"], 2);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/products/{id}/confirm-stock"),
        Some(json!({"quantity": 7})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");

    let (_, body) = send(&app, "GET", &format!("/products/{id}"), None).await;
    assert_eq!(body["stock"], 3);
    assert_eq!(body["reserved_stock"], 0);
    assert_eq!(body["version"], 3);
}

#[tokio::test]
async fn test_cancel_reports_reservation_canceled() {
    let (app, _) = inventory_app(FailureMode::None);
    let id = create_product(&app, "Widget", 1.0, 5).await;

    send(
        &app,
        "POST",
        &format!("/products/{id}/reserve-stock"),
        Some(json!({"quantity": 2})),
    )
    .await;
    let (status, body) = send(
        &app,
        "POST",
        &format!("/products/{id}/cancel-reserve"),
        Some(json!({"quantity": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "reservation_canceled");
}

#[tokio::test]
async fn test_stock_conflicts_and_invalid_quantities() {
    let (app, state) = inventory_app(FailureMode::None);
    let id = create_product(&app, "Widget", 1.0, 3).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/products/{id}/reserve-stock"),
        Some(json!({"quantity": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/products/{id}/cancel-reserve"),
        Some(json!({"quantity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/products/{id}/reserve-stock"),
        Some(json!({"quantity": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // None of the rejected calls touched the row.
    let product = state.ledger.get_product(ProductId::new(id)).await.unwrap();
    assert_eq!(product.reserved_stock(), 0);
    assert_eq!(product.version().as_i64(), 1);
}

#[tokio::test]
async fn test_failure_mode_surfaces_as_server_error() {
    let (app, _) = inventory_app(FailureMode::Reserve);
    let id = create_product(&app, "Widget", 1.0, 3).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/products/{id}/reserve-stock"),
        Some(json!({"quantity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("Simulated"));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = inventory_app(FailureMode::None);
    let id = create_product(&app, "Widget", 1.0, 3).await;
    send(
        &app,
        "POST",
        &format!("/products/{id}/reserve-stock"),
        Some(json!({"quantity": 1})),
    )
    .await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("ledger_operations_total"));
}

// -- Billing service --

const WIDGET: ProductId = ProductId::new(1);
const GADGET: ProductId = ProductId::new(2);

fn billing_app(client: InMemoryInventoryClient, shutdown: CancellationToken) -> Router {
    let state = api::create_billing_state(
        InMemoryInvoiceRepository::new(),
        client,
        InMemorySagaJournal::new(),
        SagaConfig::default(),
        shutdown,
    );
    api::create_billing_app(state, get_metrics_handle())
}

fn stocked_client() -> InMemoryInventoryClient {
    let client = InMemoryInventoryClient::new();
    client.add_product(WIDGET, "Widget", Money::from_cents(500), 10);
    client.add_product(GADGET, "Gadget", Money::from_cents(300), 5);
    client
}

async fn invoice_with_items(app: &Router, items: &[(ProductId, i64)]) -> i64 {
    let (status, body) = send(app, "POST", "/invoices", Some(json!({"number": "INV-1"}))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["id"].as_i64().unwrap();

    for (product_id, quantity) in items {
        let (status, body) = send(
            app,
            "POST",
            &format!("/invoices/{id}/items"),
            Some(json!({"product_id": product_id.as_i64(), "quantity": quantity})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
    id
}

#[tokio::test]
async fn test_create_and_fill_invoice() {
    let app = billing_app(stocked_client(), CancellationToken::new());
    let id = invoice_with_items(&app, &[(WIDGET, 2), (GADGET, 1)]).await;

    let (status, body) = send(&app, "GET", &format!("/invoices/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["number"], "INV-1");
    assert_eq!(body["status"], "OPEN");
    assert_eq!(body["total_value"], 13.0);
    assert_eq!(body["items"][0]["name"], "Widget");
    assert_eq!(body["items"][0]["price"], 5.0);
    assert!(body["closed_at"].is_null());

    let (status, body) = send(&app, "GET", "/invoices", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_add_item_errors() {
    let app = billing_app(stocked_client(), CancellationToken::new());
    let id = invoice_with_items(&app, &[]).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/invoices/{id}/items"),
        Some(json!({"product_id": 42, "quantity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/invoices/{id}/items"),
        Some(json!({"product_id": 1, "quantity": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/invoices/{id}/items"),
        Some(json!({"product_id": 2, "quantity": 6})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        "/invoices/77/items",
        Some(json!({"product_id": 1, "quantity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_item_total_overflow_is_rejected() {
    let client = stocked_client();
    let pricey = ProductId::new(3);
    client.add_product(pricey, "Pricey", Money::from_cents(i64::MAX / 2 + 1), 10);
    let app = billing_app(client, CancellationToken::new());
    let id = invoice_with_items(&app, &[]).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/invoices/{id}/items"),
        Some(json!({"product_id": 3, "quantity": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("exceeds"));

    let (_, body) = send(&app, "GET", &format!("/invoices/{id}"), None).await;
    assert!(body["items"].as_array().unwrap().is_empty());
    assert_eq!(body["total_value"], 0.0);
}

#[tokio::test]
async fn test_print_closes_invoice() {
    let client = stocked_client();
    let app = billing_app(client.clone(), CancellationToken::new());
    let id = invoice_with_items(&app, &[(WIDGET, 2), (GADGET, 1)]).await;

    let (status, body) = send(&app, "POST", &format!("/invoices/{id}/print"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Invoice printed successfully");
    assert_eq!(body["invoice"]["status"], "CLOSED");
    assert_eq!(body["invoice"]["total_value"], 13.0);
    assert!(body["invoice"]["closed_at"].is_string());
    assert_eq!(body["process_info"]["outcome"], "success");

    assert_eq!(client.stock_of(WIDGET), Some((8, 0)));
    assert_eq!(client.stock_of(GADGET), Some((4, 0)));

    // A second print is refused before touching the inventory.
    let calls = client.calls().len();
    let (status, body) = send(&app, "POST", &format!("/invoices/{id}/print"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already closed"));
    assert_eq!(client.calls().len(), calls);

    let (status, _) = send(
        &app,
        "POST",
        &format!("/invoices/{id}/items"),
        Some(json!({"product_id": 1, "quantity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_print_reservation_failure_returns_report() {
    let client = stocked_client();
    let app = billing_app(client.clone(), CancellationToken::new());
    let id = invoice_with_items(&app, &[(WIDGET, 2), (GADGET, 1)]).await;
    client.fail_on(
        InventoryOperation::Reserve,
        Some(GADGET),
        InventoryError::StockReservationFailed {
            product_id: GADGET,
            reason: "Insufficient stock".to_string(),
        },
    );

    let (status, body) = send(&app, "POST", &format!("/invoices/{id}/print"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["outcome"], "failed_at_reservation");
    assert_eq!(body["invoice_status"], "OPEN");
    assert_eq!(body["compensations"][0]["product_id"], 1);
    assert_eq!(body["compensations"][0]["succeeded"], true);
    assert_eq!(client.stock_of(WIDGET), Some((10, 0)));

    let (_, invoice) = send(&app, "GET", &format!("/invoices/{id}"), None).await;
    assert_eq!(invoice["status"], "OPEN");
}

#[tokio::test]
async fn test_print_confirmation_failure_is_server_error() {
    let client = stocked_client();
    let app = billing_app(client.clone(), CancellationToken::new());
    let id = invoice_with_items(&app, &[(WIDGET, 2), (GADGET, 1)]).await;
    client.fail_on(
        InventoryOperation::Confirm,
        Some(GADGET),
        InventoryError::ServiceError {
            status: 500,
            body: "boom".to_string(),
        },
    );

    let (status, body) = send(&app, "POST", &format!("/invoices/{id}/print"), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["outcome"], "failed_at_confirmation");
    assert_eq!(body["confirmed"][0]["product_id"], 1);
    assert_eq!(client.stock_of(WIDGET), Some((8, 0)));
    assert_eq!(client.stock_of(GADGET), Some((5, 0)));
}

#[tokio::test]
async fn test_print_empty_or_missing_invoice() {
    let app = billing_app(stocked_client(), CancellationToken::new());
    let id = invoice_with_items(&app, &[]).await;

    let (status, body) = send(&app, "POST", &format!("/invoices/{id}/print"), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["outcome"], "failed_at_close");

    let (status, _) = send(&app, "POST", "/invoices/404/print", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_print_during_shutdown_is_cancelled() {
    let client = stocked_client();
    let shutdown = CancellationToken::new();
    let app = billing_app(client.clone(), shutdown.clone());
    let id = invoice_with_items(&app, &[(WIDGET, 2)]).await;
    shutdown.cancel();

    let (status, body) = send(&app, "POST", &format!("/invoices/{id}/print"), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["outcome"], "cancelled");
    assert!(client.calls_for(InventoryOperation::Reserve).is_empty());
    assert_eq!(client.stock_of(WIDGET), Some((10, 0)));
}

// -- Both services over loopback --

async fn spawn_inventory() -> (
    String,
    Arc<api::routes::products::InventoryState<InMemoryProductRepository>>,
) {
    let (app, state) = inventory_app(FailureMode::None);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn http_billing_app(base_url: &str) -> Router {
    let client = HttpInventoryClient::new(
        InventoryClientConfig::new(base_url).with_timeout(Duration::from_secs(5)),
    )
    .unwrap();
    let state = api::create_billing_state(
        InMemoryInvoiceRepository::new(),
        client,
        InMemorySagaJournal::new(),
        SagaConfig::default(),
        CancellationToken::new(),
    );
    api::create_billing_app(state, get_metrics_handle())
}

async fn seed<R: ProductRepository>(ledger: &StockLedger<R>, name: &str, cents: i64, stock: i64) -> i64 {
    ledger
        .create_product(name.to_string(), Money::from_cents(cents), stock)
        .await
        .unwrap()
        .id()
        .as_i64()
}

#[tokio::test]
async fn test_end_to_end_print_updates_ledger() {
    let (base_url, inventory) = spawn_inventory().await;
    let a = seed(&inventory.ledger, "A", 500, 10).await;
    let b = seed(&inventory.ledger, "B", 300, 4).await;
    let app = http_billing_app(&base_url);

    let id = invoice_with_items(&app, &[(ProductId::new(a), 2), (ProductId::new(b), 1)]).await;
    let (status, body) = send(&app, "POST", &format!("/invoices/{id}/print"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["total_value"], 13.0);

    let a = inventory.ledger.get_product(ProductId::new(a)).await.unwrap();
    assert_eq!((a.stock(), a.reserved_stock()), (8, 0));
    assert_eq!(a.version().as_i64(), 3);
    let b = inventory.ledger.get_product(ProductId::new(b)).await.unwrap();
    assert_eq!((b.stock(), b.reserved_stock()), (3, 0));
}

#[tokio::test]
async fn test_end_to_end_insufficient_stock_cancels_earlier_lines() {
    let (base_url, inventory) = spawn_inventory().await;
    let a = seed(&inventory.ledger, "A", 500, 10).await;
    let b = seed(&inventory.ledger, "B", 300, 1).await;
    let app = http_billing_app(&base_url);

    let id = invoice_with_items(&app, &[(ProductId::new(a), 2), (ProductId::new(b), 1)]).await;
    // Someone else takes the last B before the invoice is printed.
    inventory
        .ledger
        .reserve_stock(ProductId::new(b), 1)
        .await
        .unwrap();

    let (status, body) = send(&app, "POST", &format!("/invoices/{id}/print"), None).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["outcome"], "failed_at_reservation");
    assert_eq!(body["compensations"].as_array().unwrap().len(), 1);

    // Reserved then released: stock intact, two versions later.
    let a = inventory.ledger.get_product(ProductId::new(a)).await.unwrap();
    assert_eq!((a.stock(), a.reserved_stock()), (10, 0));
    assert_eq!(a.version().as_i64(), 3);

    let (_, invoice) = send(&app, "GET", &format!("/invoices/{id}"), None).await;
    assert_eq!(invoice["status"], "OPEN");
    assert_eq!(invoice["total_value"], 13.0);
}

#[tokio::test]
async fn test_unreachable_inventory_is_unavailable() {
    // Bind and drop a listener to get a port nobody answers on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let app = http_billing_app(&format!("http://{addr}"));
    let id = invoice_with_items(&app, &[]).await;

    let (status, _) = send(
        &app,
        "POST",
        &format!("/invoices/{id}/items"),
        Some(json!({"product_id": 1, "quantity": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_client_trait_sees_same_ledger() {
    let (base_url, inventory) = spawn_inventory().await;
    let id = seed(&inventory.ledger, "A", 250, 6).await;
    let client = HttpInventoryClient::new(InventoryClientConfig::new(base_url)).unwrap();

    let snapshot = client.get_product(ProductId::new(id)).await.unwrap();
    assert_eq!(snapshot.price, Money::from_cents(250));
    assert_eq!(snapshot.stock, 6);

    client.reserve_stock(ProductId::new(id), 2).await.unwrap();
    client.cancel_reservation(ProductId::new(id), 2).await.unwrap();
    let err = client
        .confirm_stock(ProductId::new(id), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::StockReservationFailed { .. }));
}
