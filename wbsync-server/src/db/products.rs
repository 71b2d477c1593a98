//! Product persistence
//!
//! `ProductStore` is the single writer of product rows. Writes go through
//! [`ProductStore::upsert`], one `INSERT ... ON CONFLICT DO UPDATE` statement,
//! so concurrent syncs of the same artikul never interleave partial writes;
//! the last writer wins.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::models::{Artikul, Product, ProductData};

/// Store failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an upsert
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub product: Product,
    /// True when the row did not exist before this call
    pub created: bool,
}

const PRODUCT_COLUMNS: &str =
    "artikul, name, price_kopecks, rating, stock_quantity, sync_count, created_at, updated_at";

/// SQLite-backed product store
#[derive(Clone)]
pub struct ProductStore {
    pool: SqlitePool,
}

impl ProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the product or overwrite its mutable fields
    ///
    /// `created_at` is only written on insert.
    pub async fn upsert(&self, data: &ProductData) -> StoreResult<UpsertOutcome> {
        let now = Utc::now();

        let sql = format!(
            r#"
            INSERT INTO products (
                artikul, name, price_kopecks, rating, stock_quantity,
                sync_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(artikul) DO UPDATE SET
                name = excluded.name,
                price_kopecks = excluded.price_kopecks,
                rating = excluded.rating,
                stock_quantity = excluded.stock_quantity,
                sync_count = products.sync_count + 1,
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(data.artikul)
            .bind(&data.name)
            .bind(data.price_kopecks)
            .bind(data.rating)
            .bind(data.stock_quantity)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        let product = product_from_row(&row)?;
        let created = product.sync_count == 1;

        tracing::debug!(
            artikul = product.artikul,
            created,
            sync_count = product.sync_count,
            "Product upserted"
        );

        Ok(UpsertOutcome { product, created })
    }

    /// Load one product by artikul
    pub async fn get_by_artikul(&self, artikul: Artikul) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE artikul = ?", PRODUCT_COLUMNS);

        let row = sqlx::query(&sql)
            .bind(artikul)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(product_from_row).transpose()
    }

    pub async fn exists(&self, artikul: Artikul) -> StoreResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM products WHERE artikul = ?")
            .bind(artikul)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    /// All stored products, ordered by artikul
    pub async fn list_all(&self) -> StoreResult<Vec<Product>> {
        let sql = format!("SELECT {} FROM products ORDER BY artikul", PRODUCT_COLUMNS);

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(product_from_row)
            .collect::<Result<Vec<_>, _>>()
    }
}

fn product_from_row(row: &SqliteRow) -> StoreResult<Product> {
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Product {
        artikul: row.try_get("artikul")?,
        name: row.try_get("name")?,
        price_kopecks: row.try_get("price_kopecks")?,
        rating: row.try_get("rating")?,
        stock_quantity: row.try_get("stock_quantity")?,
        sync_count: row.try_get("sync_count")?,
        created_at,
        updated_at,
    })
}
