//! Product data types
//!
//! `ProductData` is what the catalog returns, `Product` is what the store
//! holds, `ProductView` is what the HTTP API serializes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External product identifier (Wildberries "nm" / artikul)
pub type Artikul = i64;

/// Product fields as observed upstream at fetch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductData {
    pub artikul: Artikul,
    pub name: String,
    /// Price in minor units (kopecks), as transmitted upstream
    pub price_kopecks: i64,
    /// Rating rounded to two decimal places, within [0, 5]
    pub rating: f64,
    pub stock_quantity: i64,
}

/// Persisted product record
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub artikul: Artikul,
    pub name: String,
    pub price_kopecks: i64,
    pub rating: f64,
    pub stock_quantity: i64,
    /// Successful syncs so far; 1 right after creation
    pub sync_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Price in major units (rubles)
    pub fn price(&self) -> f64 {
        self.price_kopecks as f64 / 100.0
    }

    /// Price with exactly two decimals, e.g. `199.00`
    pub fn price_display(&self) -> String {
        format_kopecks(self.price_kopecks)
    }

    /// True if the stored fields already equal `data`
    pub fn matches(&self, data: &ProductData) -> bool {
        self.artikul == data.artikul
            && self.name == data.name
            && self.price_kopecks == data.price_kopecks
            && self.rating == data.rating
            && self.stock_quantity == data.stock_quantity
    }
}

/// Format a kopeck amount as rubles with two decimals
pub fn format_kopecks(kopecks: i64) -> String {
    let sign = if kopecks < 0 { "-" } else { "" };
    let abs = kopecks.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Round a rating to the two decimals the store keeps
pub fn round_rating(rating: f64) -> f64 {
    (rating * 100.0).round() / 100.0
}

/// Product as returned by the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductView {
    pub artikul: Artikul,
    pub name: String,
    pub price: f64,
    pub rating: f64,
    pub stock_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            artikul: product.artikul,
            name: product.name.clone(),
            price: product.price(),
            rating: product.rating,
            stock_quantity: product.stock_quantity,
            created_at: product.created_at,
            updated_at: product.updated_at,
            message: None,
        }
    }
}
