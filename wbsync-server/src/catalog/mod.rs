//! External catalog client
//!
//! A [`CatalogSource`] performs exactly one request against the upstream
//! catalog. [`CatalogClient`] wraps a source with the retry policy and is the
//! only entry point the rest of the service uses.

mod retry;
pub mod wildberries;

pub use retry::RetryPolicy;
pub use wildberries::WildberriesSource;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Artikul, ProductData};
use retry::{retry_transient, RetryFailure};

/// Failure of a single upstream attempt
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// Network or HTTP-layer failure; worth retrying
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// Upstream answered, but the payload is not what we expect
    #[error("unexpected upstream payload: {0}")]
    DataShape(String),
}

/// Terminal failure of [`CatalogClient::fetch_item`]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("catalog unavailable after {attempts} attempt(s): {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("malformed catalog response: {0}")]
    DataShape(String),
}

/// One attempt at loading a product from the upstream catalog
///
/// `Ok(None)` means upstream answered and confirmed the product does not exist.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self, artikul: Artikul) -> Result<Option<ProductData>, FetchError>;
}

/// Resilient catalog client: a source plus its retry policy
#[derive(Clone)]
pub struct CatalogClient {
    source: Arc<dyn CatalogSource>,
    policy: RetryPolicy,
}

impl CatalogClient {
    pub fn new(source: Arc<dyn CatalogSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Fetch one product, retrying transient failures per the policy
    pub async fn fetch_item(&self, artikul: Artikul) -> Result<Option<ProductData>, CatalogError> {
        tracing::debug!(artikul, "Fetching product from catalog");

        let source = &self.source;
        let result = retry_transient("catalog fetch", self.policy, move || source.fetch(artikul)).await;

        match result {
            Ok(found) => Ok(found),
            Err(RetryFailure::Exhausted { attempts, last_error }) => {
                Err(CatalogError::Unavailable { attempts, last_error })
            }
            Err(RetryFailure::Fatal { error: FetchError::DataShape(msg), .. }) => {
                tracing::error!(artikul, error = %msg, "Catalog returned malformed product data");
                Err(CatalogError::DataShape(msg))
            }
            // Transient errors never come back as Fatal
            Err(RetryFailure::Fatal { attempt, error: FetchError::Transient(msg) }) => {
                Err(CatalogError::Unavailable { attempts: attempt, last_error: msg })
            }
        }
    }
}
