//! Product API handlers
//!
//! GET /api/v1/products/product/:artikul, GET /api/v1/products,
//! POST|DELETE /api/v1/products/subscribe/:artikul,
//! GET /api/v1/products/subscriptions

use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{Artikul, ProductView},
    scheduler::SubscriptionHandle,
    AppState,
};

/// Message attached to a product fetched and stored by this request
pub const PRODUCT_ADDED_MESSAGE: &str = "Product added to the database";

/// POST/DELETE /subscribe response
#[derive(Debug, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub message: String,
    pub artikul: Artikul,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<Uuid>,
}

/// GET /subscriptions response
#[derive(Debug, Serialize)]
pub struct SubscriptionListResponse {
    pub interval_secs: u64,
    pub subscriptions: Vec<SubscriptionHandle>,
}

fn parse_artikul(path: Result<Path<Artikul>, PathRejection>) -> ApiResult<Artikul> {
    let Path(artikul) = path.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if artikul <= 0 {
        return Err(ApiError::BadRequest(format!(
            "Artikul must be a positive integer, got {}",
            artikul
        )));
    }
    Ok(artikul)
}

/// GET /api/v1/products/product/:artikul
///
/// Returns the stored product, loading it from the catalog on first request.
pub async fn get_product(
    State(state): State<AppState>,
    path: Result<Path<Artikul>, PathRejection>,
) -> ApiResult<Json<ProductView>> {
    let artikul = parse_artikul(path)?;

    let resolved = state.sync.resolve(artikul).await?;

    let mut view = ProductView::from(&resolved.product);
    if resolved.newly_created {
        view.message = Some(PRODUCT_ADDED_MESSAGE.to_string());
    }
    Ok(Json(view))
}

/// GET /api/v1/products
pub async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<ProductView>>> {
    let products = state
        .sync
        .store()
        .list_all()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(products.iter().map(ProductView::from).collect()))
}

/// POST /api/v1/products/subscribe/:artikul
///
/// The product must already be stored (GET it first).
pub async fn subscribe(
    State(state): State<AppState>,
    path: Result<Path<Artikul>, PathRejection>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let artikul = parse_artikul(path)?;

    let handle = state.scheduler.subscribe(artikul).await?;

    let message = if handle.already_subscribed {
        format!("Already subscribed to product {}", artikul)
    } else {
        format!("Subscribed to product {}", artikul)
    };

    Ok(Json(SubscriptionResponse {
        message,
        artikul,
        subscription_id: Some(handle.subscription_id),
    }))
}

/// DELETE /api/v1/products/subscribe/:artikul
pub async fn unsubscribe(
    State(state): State<AppState>,
    path: Result<Path<Artikul>, PathRejection>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let artikul = parse_artikul(path)?;

    if !state.scheduler.cancel_artikul(artikul).await? {
        return Err(ApiError::NotFound(format!(
            "No subscription for product {}",
            artikul
        )));
    }

    Ok(Json(SubscriptionResponse {
        message: format!("Unsubscribed from product {}", artikul),
        artikul,
        subscription_id: None,
    }))
}

/// GET /api/v1/products/subscriptions
pub async fn list_subscriptions(State(state): State<AppState>) -> Json<SubscriptionListResponse> {
    Json(SubscriptionListResponse {
        interval_secs: state.scheduler.interval().as_secs(),
        subscriptions: state.scheduler.list().await,
    })
}

/// Build product routes
pub fn product_routes() -> Router<AppState> {
    use super::API_PREFIX;

    Router::new()
        .route(API_PREFIX, get(list_products))
        .route(&format!("{}/product/:artikul", API_PREFIX), get(get_product))
        .route(
            &format!("{}/subscribe/:artikul", API_PREFIX),
            axum::routing::post(subscribe).delete(unsubscribe),
        )
        .route(
            &format!("{}/subscriptions", API_PREFIX),
            get(list_subscriptions),
        )
}
