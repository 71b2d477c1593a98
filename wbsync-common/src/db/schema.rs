//! Table definitions
//!
//! Every statement is `CREATE ... IF NOT EXISTS`; running the whole set
//! repeatedly is a no-op.

use crate::Result;
use sqlx::SqlitePool;
use tracing::debug;

/// Create all tables used by wbsync
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_products_table(pool).await?;
    create_subscriptions_table(pool).await?;

    debug!("Database schema ready (products, subscriptions)");
    Ok(())
}

/// One row per external artikul; price held in kopecks
async fn create_products_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS products (
            artikul INTEGER PRIMARY KEY CHECK (artikul > 0),
            name TEXT NOT NULL,
            price_kopecks INTEGER NOT NULL CHECK (price_kopecks >= 0),
            rating REAL NOT NULL CHECK (rating >= 0 AND rating <= 5),
            stock_quantity INTEGER NOT NULL CHECK (stock_quantity >= 0),
            sync_count INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_subscriptions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscriptions (
            subscription_id TEXT PRIMARY KEY,
            artikul INTEGER NOT NULL UNIQUE REFERENCES products(artikul),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
