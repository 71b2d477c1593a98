//! Subscription persistence
//!
//! One row per subscribed artikul. Rows outlive the process so the scheduler
//! can re-arm its jobs on the next start.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::products::{ProductStore, StoreResult};
use crate::models::Artikul;

/// Persisted subscription
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub subscription_id: Uuid,
    pub artikul: Artikul,
    pub created_at: DateTime<Utc>,
}

impl ProductStore {
    /// Insert a subscription; an existing row for the artikul is kept and
    /// returned instead.
    pub async fn insert_subscription(&self, artikul: Artikul) -> StoreResult<(SubscriptionRecord, bool)> {
        let candidate = SubscriptionRecord {
            subscription_id: Uuid::new_v4(),
            artikul,
            created_at: Utc::now(),
        };

        let inserted = sqlx::query(
            r#"
            INSERT INTO subscriptions (subscription_id, artikul, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(artikul) DO NOTHING
            "#,
        )
        .bind(candidate.subscription_id.to_string())
        .bind(candidate.artikul)
        .bind(candidate.created_at)
        .execute(self.pool())
        .await?
        .rows_affected()
            == 1;

        if inserted {
            return Ok((candidate, true));
        }

        let row = sqlx::query(
            "SELECT subscription_id, artikul, created_at FROM subscriptions WHERE artikul = ?",
        )
        .bind(artikul)
        .fetch_one(self.pool())
        .await?;

        Ok((record_from_row(&row)?, false))
    }

    /// Remove the subscription for an artikul; true if a row was deleted
    pub async fn delete_subscription(&self, artikul: Artikul) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE artikul = ?")
            .bind(artikul)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_subscriptions(&self) -> StoreResult<Vec<SubscriptionRecord>> {
        let rows = sqlx::query(
            "SELECT subscription_id, artikul, created_at FROM subscriptions ORDER BY artikul",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<SubscriptionRecord> {
    let id_str: String = row.try_get("subscription_id")?;
    let subscription_id = Uuid::parse_str(&id_str).map_err(|e| sqlx::Error::ColumnDecode {
        index: "subscription_id".to_string(),
        source: Box::new(e),
    })?;

    Ok(SubscriptionRecord {
        subscription_id,
        artikul: row.try_get("artikul")?,
        created_at: row.try_get("created_at")?,
    })
}
