//! Product synchronizer
//!
//! Read-through cache over the catalog: `resolve` serves stored products
//! as-is and only goes upstream on a miss. Staleness is corrected by the
//! refresh scheduler calling `refresh`, never by the read path.

use std::sync::Arc;
use thiserror::Error;

use crate::catalog::{CatalogClient, CatalogError};
use crate::db::{ProductStore, StoreError};
use crate::models::{Artikul, Product};

#[derive(Debug, Error)]
pub enum SyncError {
    /// Upstream confirmed the product does not exist
    #[error("product {0} not found in catalog")]
    ItemNotFound(Artikul),

    /// Fetch retries exhausted
    #[error("catalog unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("catalog returned malformed data: {0}")]
    MalformedUpstream(String),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl From<CatalogError> for SyncError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Unavailable { attempts, last_error } => SyncError::UpstreamUnavailable(
                format!("{} attempt(s) failed, last error: {}", attempts, last_error),
            ),
            CatalogError::DataShape(msg) => SyncError::MalformedUpstream(msg),
        }
    }
}

/// Product returned by [`Synchronizer::resolve`]
#[derive(Debug, Clone)]
pub struct ResolvedProduct {
    pub product: Product,
    /// Fetched and stored by this call (cache miss)
    pub newly_created: bool,
}

/// What a scheduled refresh did
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Stored record now holds the latest upstream values
    Updated(Product),
    /// Upstream no longer lists the product; stored record left untouched
    MissingUpstream,
}

struct Inner {
    store: ProductStore,
    catalog: CatalogClient,
}

/// Orchestrates store reads, catalog fetches and upserts
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

impl Synchronizer {
    pub fn new(store: ProductStore, catalog: CatalogClient) -> Self {
        Self {
            inner: Arc::new(Inner { store, catalog }),
        }
    }

    pub fn store(&self) -> &ProductStore {
        &self.inner.store
    }

    /// Return the stored product, fetching and storing it on a miss
    pub async fn resolve(&self, artikul: Artikul) -> Result<ResolvedProduct, SyncError> {
        if let Some(product) = self.inner.store.get_by_artikul(artikul).await? {
            tracing::debug!(artikul, "Product served from store");
            return Ok(ResolvedProduct {
                product,
                newly_created: false,
            });
        }

        let data = self
            .inner
            .catalog
            .fetch_item(artikul)
            .await?
            .ok_or(SyncError::ItemNotFound(artikul))?;

        let outcome = self.inner.store.upsert(&data).await?;

        tracing::info!(
            artikul,
            name = %outcome.product.name,
            created = outcome.created,
            "Product fetched from catalog and stored"
        );

        // A concurrent refresh may have inserted first; report what we saw
        Ok(ResolvedProduct {
            product: outcome.product,
            newly_created: outcome.created,
        })
    }

    /// Fetch and store unconditionally; used by scheduled jobs
    pub async fn refresh(&self, artikul: Artikul) -> Result<RefreshOutcome, SyncError> {
        match self.inner.catalog.fetch_item(artikul).await? {
            Some(data) => {
                let outcome = self.inner.store.upsert(&data).await?;
                tracing::info!(
                    artikul,
                    price = %outcome.product.price_display(),
                    stock_quantity = outcome.product.stock_quantity,
                    sync_count = outcome.product.sync_count,
                    "Product refreshed"
                );
                Ok(RefreshOutcome::Updated(outcome.product))
            }
            None => {
                tracing::warn!(artikul, "Product no longer listed upstream, keeping stored record");
                Ok(RefreshOutcome::MissingUpstream)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::{widget, FakeSource};
    use crate::catalog::{FetchError, RetryPolicy};
    use crate::models::ProductData;
    use wbsync_common::db::init_memory_database;

    async fn setup() -> (Synchronizer, Arc<FakeSource>) {
        let source = Arc::new(FakeSource::new());
        let store = ProductStore::new(init_memory_database().await.unwrap());
        let catalog = CatalogClient::new(source.clone(), RetryPolicy::immediate(3));
        (Synchronizer::new(store, catalog), source)
    }

    #[tokio::test]
    async fn test_resolve_miss_fetches_and_creates() {
        let (sync, source) = setup().await;
        source.set_product(widget());

        let resolved = sync.resolve(12345).await.unwrap();

        assert!(resolved.newly_created);
        assert_eq!(resolved.product.artikul, 12345);
        assert_eq!(resolved.product.name, "Widget");
        assert_eq!(resolved.product.price(), 199.0);
        assert_eq!(resolved.product.price_display(), "199.00");
        assert_eq!(resolved.product.rating, 4.5);
        assert_eq!(resolved.product.stock_quantity, 10);
        assert_eq!(source.calls(), 1);
        assert_eq!(sync.store().list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_hit_skips_catalog() {
        let (sync, source) = setup().await;
        sync.store().upsert(&widget()).await.unwrap();
        // Upstream changed, but the read path must not notice
        source.set_product(ProductData {
            price_kopecks: 1,
            ..widget()
        });

        let resolved = sync.resolve(12345).await.unwrap();

        assert!(!resolved.newly_created);
        assert_eq!(resolved.product.price_kopecks, 19900);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_not_found_writes_nothing() {
        let (sync, source) = setup().await;

        let result = sync.resolve(12345).await;

        assert!(matches!(result, Err(SyncError::ItemNotFound(12345))));
        assert_eq!(source.calls(), 1);
        assert!(sync.store().list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_upstream_unavailable() {
        let (sync, source) = setup().await;
        source.set_product(widget());
        for _ in 0..3 {
            source.push_response(Err(FetchError::Transient("timeout".into())));
        }

        let result = sync.resolve(12345).await;

        assert!(matches!(result, Err(SyncError::UpstreamUnavailable(_))));
        assert_eq!(source.calls(), 3);
        assert!(sync.store().get_by_artikul(12345).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_malformed_upstream() {
        let (sync, source) = setup().await;
        source.push_response(Err(FetchError::DataShape("missing name".into())));

        let result = sync.resolve(12345).await;

        assert!(matches!(result, Err(SyncError::MalformedUpstream(_))));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_overwrites_existing() {
        let (sync, source) = setup().await;
        sync.store().upsert(&widget()).await.unwrap();
        source.set_product(ProductData {
            price_kopecks: 18900,
            stock_quantity: 4,
            ..widget()
        });

        let outcome = sync.refresh(12345).await.unwrap();

        match outcome {
            RefreshOutcome::Updated(product) => {
                assert_eq!(product.price_kopecks, 18900);
                assert_eq!(product.stock_quantity, 4);
                assert_eq!(product.sync_count, 2);
            }
            other => panic!("expected update, got {:?}", other),
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_missing_upstream_keeps_record() {
        let (sync, _source) = setup().await;
        sync.store().upsert(&widget()).await.unwrap();

        let outcome = sync.refresh(12345).await.unwrap();

        assert_eq!(outcome, RefreshOutcome::MissingUpstream);
        assert!(sync.store().get_by_artikul(12345).await.unwrap().is_some());
    }
}
