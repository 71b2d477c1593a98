//! Integration tests for the product HTTP API
//!
//! Drives the axum router directly with an in-memory database and a
//! scripted catalog source.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

use wbsync_server::catalog::{CatalogClient, CatalogSource, FetchError, RetryPolicy};
use wbsync_server::db::ProductStore;
use wbsync_server::models::{Artikul, ProductData};
use wbsync_server::scheduler::RefreshScheduler;
use wbsync_server::sync::Synchronizer;
use wbsync_server::{build_router, AppState};

/// Catalog with fixed contents; `down` makes every fetch fail transiently
#[derive(Default)]
struct StubCatalog {
    products: Mutex<HashMap<Artikul, ProductData>>,
    down: Mutex<bool>,
    calls: AtomicU32,
}

#[async_trait]
impl CatalogSource for StubCatalog {
    async fn fetch(&self, artikul: Artikul) -> Result<Option<ProductData>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.down.lock().unwrap() {
            return Err(FetchError::Transient("connection refused".to_string()));
        }
        Ok(self.products.lock().unwrap().get(&artikul).cloned())
    }
}

fn widget() -> ProductData {
    ProductData {
        artikul: 12345,
        name: "Widget".to_string(),
        price_kopecks: 19900,
        rating: 4.5,
        stock_quantity: 10,
    }
}

struct TestApp {
    router: Router,
    catalog: Arc<StubCatalog>,
    scheduler: RefreshScheduler,
}

async fn create_test_app() -> TestApp {
    let pool = wbsync_common::db::init_memory_database()
        .await
        .expect("Failed to create in-memory database");

    let catalog = Arc::new(StubCatalog::default());
    catalog.products.lock().unwrap().insert(12345, widget());

    let client = CatalogClient::new(catalog.clone(), RetryPolicy::immediate(3));
    let sync = Synchronizer::new(ProductStore::new(pool), client);
    let scheduler = RefreshScheduler::new(sync.clone(), Duration::from_secs(3600));

    let router = build_router(AppState::new(sync, scheduler.clone()));

    TestApp {
        router,
        catalog,
        scheduler,
    }
}

async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app().await;

    let (status, json) = send(&app.router, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "wbsync-server");
    assert_eq!(json["active_subscriptions"], 0);
}

#[tokio::test]
async fn test_get_product_creates_on_first_request() {
    let app = create_test_app().await;

    let (status, json) = send(&app.router, "GET", "/api/v1/products/product/12345").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["artikul"], 12345);
    assert_eq!(json["name"], "Widget");
    assert_eq!(json["price"], 199.0);
    assert_eq!(json["rating"], 4.5);
    assert_eq!(json["stock_quantity"], 10);
    assert_eq!(json["message"], "Product added to the database");
    assert_eq!(app.catalog.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_product_second_request_served_from_store() {
    let app = create_test_app().await;
    send(&app.router, "GET", "/api/v1/products/product/12345").await;

    let (status, json) = send(&app.router, "GET", "/api/v1/products/product/12345").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json.get("message").is_none());
    assert_eq!(app.catalog.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_get_unknown_product_is_404() {
    let app = create_test_app().await;

    let (status, json) = send(&app.router, "GET", "/api/v1/products/product/555").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");

    let (_, list) = send(&app.router, "GET", "/api/v1/products").await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_upstream_down_is_500() {
    let app = create_test_app().await;
    *app.catalog.down.lock().unwrap() = true;

    let (status, json) = send(&app.router, "GET", "/api/v1/products/product/12345").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(app.catalog.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalid_artikul_is_400() {
    let app = create_test_app().await;

    let (status, _) = send(&app.router, "GET", "/api/v1/products/product/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, "GET", "/api/v1/products/product/0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.catalog.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_list_products() {
    let app = create_test_app().await;
    send(&app.router, "GET", "/api/v1/products/product/12345").await;

    let (status, json) = send(&app.router, "GET", "/api/v1/products").await;

    assert_eq!(status, StatusCode::OK);
    let items = json.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["artikul"], 12345);
}

#[tokio::test]
async fn test_subscribe_unknown_product_is_404() {
    let app = create_test_app().await;

    let (status, _) = send(&app.router, "POST", "/api/v1/products/subscribe/12345").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.scheduler.job_count().await, 0);
    // Subscribing never fetches
    assert_eq!(app.catalog.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subscribe_and_unsubscribe() {
    let app = create_test_app().await;
    send(&app.router, "GET", "/api/v1/products/product/12345").await;

    let (status, json) = send(&app.router, "POST", "/api/v1/products/subscribe/12345").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Subscribed to product 12345");
    assert!(json["subscription_id"].is_string());

    let (_, again) = send(&app.router, "POST", "/api/v1/products/subscribe/12345").await;
    assert_eq!(again["message"], "Already subscribed to product 12345");
    assert_eq!(again["subscription_id"], json["subscription_id"]);

    let (status, list) = send(&app.router, "GET", "/api/v1/products/subscriptions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["interval_secs"], 3600);
    assert_eq!(list["subscriptions"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app.router, "DELETE", "/api/v1/products/subscribe/12345").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, "DELETE", "/api/v1/products/subscribe/12345").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(app.scheduler.job_count().await, 0);
}

#[tokio::test]
async fn test_subscribe_after_shutdown_is_503() {
    let app = create_test_app().await;
    send(&app.router, "GET", "/api/v1/products/product/12345").await;
    app.scheduler.shutdown().await;

    let (status, json) = send(&app.router, "POST", "/api/v1/products/subscribe/12345").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["code"], "UNAVAILABLE");
}
