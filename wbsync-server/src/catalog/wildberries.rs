//! Wildberries card API source
//!
//! Endpoint: `GET {base_url}/cards/v1/detail?appType=1&curr=rub&dest=-1257786&spp=30&nm={artikul}`
//!
//! Response shape (only the fields we read):
//! `{"data": {"products": [{"id", "name", "salePriceU", "rating", "totalQuantity"}]}}`
//! with `salePriceU` in kopecks.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{CatalogSource, FetchError};
use crate::models::{round_rating, Artikul, ProductData};

const DETAIL_PATH: &str = "/cards/v1/detail";

/// Fixed query parameters the card API expects alongside `nm`
const DETAIL_QUERY: [(&str, &str); 4] = [
    ("appType", "1"),
    ("curr", "rub"),
    ("dest", "-1257786"),
    ("spp", "30"),
];

const USER_AGENT: &str = concat!("wbsync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct DetailResponse {
    data: Option<DetailData>,
}

#[derive(Debug, Deserialize)]
struct DetailData {
    products: Option<Vec<RawProduct>>,
}

/// Every field optional so a missing one becomes a `DataShape` error
/// naming the field, not a generic decode failure.
#[derive(Debug, Deserialize)]
struct RawProduct {
    id: Option<i64>,
    name: Option<String>,
    #[serde(rename = "salePriceU")]
    sale_price_u: Option<i64>,
    rating: Option<f64>,
    #[serde(rename = "totalQuantity")]
    total_quantity: Option<i64>,
}

/// reqwest-backed [`CatalogSource`] for the Wildberries card API
pub struct WildberriesSource {
    http_client: Client,
    base_url: String,
}

impl WildberriesSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );

        let http_client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn detail_url(&self) -> String {
        format!("{}{}", self.base_url, DETAIL_PATH)
    }
}

#[async_trait]
impl CatalogSource for WildberriesSource {
    async fn fetch(&self, artikul: Artikul) -> Result<Option<ProductData>, FetchError> {
        let url = self.detail_url();
        debug!(artikul, url = %url, "Querying Wildberries card API");

        let response = self
            .http_client
            .get(&url)
            .query(&DETAIL_QUERY)
            .query(&[("nm", artikul)])
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transient(format!("upstream returned {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transient(format!("reading body failed: {}", e)))?;

        parse_detail_response(artikul, &body)
    }
}

/// Decode a card API body into the first product, if any
pub fn parse_detail_response(
    artikul: Artikul,
    body: &[u8],
) -> Result<Option<ProductData>, FetchError> {
    let response: DetailResponse = serde_json::from_slice(body)
        .map_err(|e| FetchError::DataShape(format!("invalid JSON: {}", e)))?;

    let first = response
        .data
        .and_then(|d| d.products)
        .and_then(|products| products.into_iter().next());

    let Some(raw) = first else {
        debug!(artikul, "Catalog has no product for artikul");
        return Ok(None);
    };

    let id = raw.id.ok_or_else(|| missing("id"))?;
    let name = raw.name.ok_or_else(|| missing("name"))?;
    let price_kopecks = raw.sale_price_u.ok_or_else(|| missing("salePriceU"))?;
    let rating = raw.rating.ok_or_else(|| missing("rating"))?;
    let stock_quantity = raw.total_quantity.ok_or_else(|| missing("totalQuantity"))?;

    if id != artikul {
        return Err(FetchError::DataShape(format!(
            "requested artikul {} but catalog returned {}",
            artikul, id
        )));
    }
    if price_kopecks < 0 {
        return Err(FetchError::DataShape(format!("negative price {}", price_kopecks)));
    }
    if stock_quantity < 0 {
        return Err(FetchError::DataShape(format!(
            "negative stock quantity {}",
            stock_quantity
        )));
    }
    if !(0.0..=5.0).contains(&rating) {
        return Err(FetchError::DataShape(format!("rating {} outside 0..=5", rating)));
    }

    Ok(Some(ProductData {
        artikul: id,
        name,
        price_kopecks,
        rating: round_rating(rating),
        stock_quantity,
    }))
}

fn missing(field: &str) -> FetchError {
    FetchError::DataShape(format!("product is missing field '{}'", field))
}
