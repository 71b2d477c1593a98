//! HTTP API handlers for wbsync-server

pub mod health;
pub mod products;

pub use health::health_routes;
pub use products::product_routes;

/// Prefix shared by all product endpoints
pub const API_PREFIX: &str = "/api/v1/products";
