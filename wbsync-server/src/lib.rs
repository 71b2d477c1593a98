//! wbsync-server library interface
//!
//! Keeps a local SQLite copy of Wildberries product cards in sync with the
//! upstream catalog and serves it over HTTP and a Telegram bot.
//!
//! Request flow: route or chat message → [`sync::Synchronizer`] → store read
//! → on miss [`catalog::CatalogClient`] → store upsert. Subscriptions register
//! a job with [`scheduler::RefreshScheduler`], which calls the synchronizer's
//! refresh path on every tick.

pub mod api;
pub mod bot;
pub mod catalog;
pub mod db;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod sync;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::trace::TraceLayer;

use crate::scheduler::RefreshScheduler;
use crate::sync::Synchronizer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sync: Synchronizer,
    pub scheduler: RefreshScheduler,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(sync: Synchronizer, scheduler: RefreshScheduler) -> Self {
        Self {
            sync,
            scheduler,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::product_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
