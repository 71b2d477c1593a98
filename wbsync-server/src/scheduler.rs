//! Recurring refresh scheduler
//!
//! One tokio task per subscribed artikul, each calling
//! [`Synchronizer::refresh`] on a fixed interval until cancelled. A failed
//! refresh is logged and the job keeps running.
//!
//! Subscriptions are deduplicated by artikul and persisted, so `start()`
//! re-arms them after a restart. `shutdown()` stops every job but keeps the
//! persisted rows; `cancel()` stops one job and forgets it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::{StoreError, SubscriptionRecord};
use crate::models::Artikul;
use crate::sync::Synchronizer;

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Subscribe requires the product to be stored already
    #[error("product {0} is not stored; resolve it before subscribing")]
    UnknownItem(Artikul),

    #[error("scheduler is shut down")]
    ShutDown,

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

/// Identifies one registered refresh job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionHandle {
    pub subscription_id: Uuid,
    pub artikul: Artikul,
    pub created_at: DateTime<Utc>,
    /// The artikul already had a job; this is that job's handle
    pub already_subscribed: bool,
}

impl SubscriptionHandle {
    fn from_record(record: &SubscriptionRecord, already_subscribed: bool) -> Self {
        Self {
            subscription_id: record.subscription_id,
            artikul: record.artikul,
            created_at: record.created_at,
            already_subscribed,
        }
    }
}

struct Job {
    record: SubscriptionRecord,
    token: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    sync: Synchronizer,
    interval: Duration,
    jobs: Mutex<HashMap<Artikul, Job>>,
    shutdown: CancellationToken,
}

/// Service object owning all recurring refresh jobs
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(sync: Synchronizer, interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                sync,
                interval,
                jobs: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Re-arm persisted subscriptions; returns how many jobs are running
    pub async fn start(&self) -> Result<usize, ScheduleError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ScheduleError::ShutDown);
        }

        let records = self.inner.sync.store().list_subscriptions().await?;
        let mut jobs = self.inner.jobs.lock().await;

        for record in records {
            if !jobs.contains_key(&record.artikul) {
                let job = self.spawn_job(record);
                jobs.insert(job.record.artikul, job);
            }
        }

        tracing::info!(
            jobs = jobs.len(),
            interval_secs = self.inner.interval.as_secs(),
            "Refresh scheduler started"
        );
        Ok(jobs.len())
    }

    /// Register a recurring refresh for a stored product
    pub async fn subscribe(&self, artikul: Artikul) -> Result<SubscriptionHandle, ScheduleError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ScheduleError::ShutDown);
        }

        // Held across the insert so two concurrent subscribes cannot both spawn
        let mut jobs = self.inner.jobs.lock().await;

        if let Some(job) = jobs.get(&artikul) {
            tracing::debug!(artikul, "Already subscribed");
            return Ok(SubscriptionHandle::from_record(&job.record, true));
        }

        let store = self.inner.sync.store();
        if !store.exists(artikul).await? {
            return Err(ScheduleError::UnknownItem(artikul));
        }

        let (record, created) = store.insert_subscription(artikul).await?;
        let handle = SubscriptionHandle::from_record(&record, !created);

        let job = self.spawn_job(record);
        jobs.insert(artikul, job);

        tracing::info!(
            artikul,
            subscription_id = %handle.subscription_id,
            "Subscribed to product refresh"
        );
        Ok(handle)
    }

    /// Stop and forget the job behind `handle`; no-op if already gone
    pub async fn cancel(&self, handle: &SubscriptionHandle) -> Result<bool, ScheduleError> {
        {
            let jobs = self.inner.jobs.lock().await;
            match jobs.get(&handle.artikul) {
                Some(job) if job.record.subscription_id != handle.subscription_id => {
                    return Ok(false);
                }
                _ => {}
            }
        }
        self.cancel_artikul(handle.artikul).await
    }

    /// Stop and forget the job for `artikul`; no-op if none
    pub async fn cancel_artikul(&self, artikul: Artikul) -> Result<bool, ScheduleError> {
        let job = self.inner.jobs.lock().await.remove(&artikul);
        let running = job.is_some();

        if let Some(job) = job {
            job.token.cancel();
        }
        let persisted = self.inner.sync.store().delete_subscription(artikul).await?;

        if running || persisted {
            tracing::info!(artikul, "Subscription cancelled");
        }
        Ok(running || persisted)
    }

    /// Stop all jobs. Persisted subscriptions are kept for the next start.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();

        let jobs: Vec<Job> = {
            let mut jobs = self.inner.jobs.lock().await;
            jobs.drain().map(|(_, job)| job).collect()
        };

        if jobs.is_empty() {
            return;
        }

        let count = jobs.len();
        for job in jobs {
            job.token.cancel();
            // A refresh in flight finishes before the task exits
            if let Err(e) = job.task.await {
                tracing::warn!(artikul = job.record.artikul, error = %e, "Refresh job ended abnormally");
            }
        }

        tracing::info!(jobs = count, "Refresh scheduler stopped");
    }

    pub async fn list(&self) -> Vec<SubscriptionHandle> {
        let jobs = self.inner.jobs.lock().await;
        let mut handles: Vec<_> = jobs
            .values()
            .map(|job| SubscriptionHandle::from_record(&job.record, false))
            .collect();
        handles.sort_by_key(|h| h.artikul);
        handles
    }

    pub async fn job_count(&self) -> usize {
        self.inner.jobs.lock().await.len()
    }

    fn spawn_job(&self, record: SubscriptionRecord) -> Job {
        let token = self.inner.shutdown.child_token();
        let task = tokio::spawn(run_refresh_job(
            self.inner.sync.clone(),
            record.artikul,
            self.inner.interval,
            token.clone(),
        ));

        Job {
            record,
            token,
            task,
        }
    }
}

async fn run_refresh_job(
    sync: Synchronizer,
    artikul: Artikul,
    interval: Duration,
    token: CancellationToken,
) {
    // First refresh one full interval after subscribing
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = sync.refresh(artikul).await {
                    tracing::warn!(artikul, error = %e, "Scheduled refresh failed, will retry next interval");
                }
            }
        }
    }

    tracing::debug!(artikul, "Refresh job stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testing::{widget, FakeSource};
    use crate::catalog::{CatalogClient, FetchError, RetryPolicy};
    use crate::db::ProductStore;
    use crate::models::ProductData;
    use wbsync_common::db::init_memory_database;

    const TICK: Duration = Duration::from_millis(40);

    async fn setup() -> (RefreshScheduler, Synchronizer, Arc<FakeSource>) {
        let source = Arc::new(FakeSource::new().with_product(widget()));
        let store = ProductStore::new(init_memory_database().await.unwrap());
        let catalog = CatalogClient::new(source.clone(), RetryPolicy::immediate(1));
        let sync = Synchronizer::new(store, catalog);
        (RefreshScheduler::new(sync.clone(), TICK), sync, source)
    }

    #[tokio::test]
    async fn test_subscribe_unknown_item_registers_nothing() {
        let (scheduler, sync, source) = setup().await;

        let result = scheduler.subscribe(12345).await;

        assert!(matches!(result, Err(ScheduleError::UnknownItem(12345))));
        assert_eq!(scheduler.job_count().await, 0);
        assert!(sync.store().list_subscriptions().await.unwrap().is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_job_refreshes_on_interval() {
        let (scheduler, sync, source) = setup().await;
        sync.resolve(12345).await.unwrap();
        source.set_product(ProductData {
            stock_quantity: 99,
            ..widget()
        });

        scheduler.subscribe(12345).await.unwrap();
        tokio::time::sleep(TICK * 3 + TICK / 2).await;
        scheduler.shutdown().await;

        // One call from resolve, then one per tick
        assert!(source.calls() >= 3, "calls = {}", source.calls());
        let stored = sync.store().get_by_artikul(12345).await.unwrap().unwrap();
        assert_eq!(stored.stock_quantity, 99);
        assert!(stored.sync_count >= 2);
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_returns_existing_job() {
        let (scheduler, sync, _source) = setup().await;
        sync.resolve(12345).await.unwrap();

        let first = scheduler.subscribe(12345).await.unwrap();
        let second = scheduler.subscribe(12345).await.unwrap();

        assert!(!first.already_subscribed);
        assert!(second.already_subscribed);
        assert_eq!(first.subscription_id, second.subscription_id);
        assert_eq!(scheduler.job_count().await, 1);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_job_alive() {
        let (scheduler, sync, source) = setup().await;
        sync.resolve(12345).await.unwrap();
        source.push_response(Err(FetchError::Transient("timeout".into())));
        source.push_response(Err(FetchError::DataShape("garbage".into())));
        source.set_product(ProductData {
            price_kopecks: 100,
            ..widget()
        });

        scheduler.subscribe(12345).await.unwrap();
        tokio::time::sleep(TICK * 4 + TICK / 2).await;
        scheduler.shutdown().await;

        let stored = sync.store().get_by_artikul(12345).await.unwrap().unwrap();
        assert_eq!(stored.price_kopecks, 100, "later ticks must still run");
    }

    #[tokio::test]
    async fn test_cancel_stops_job_and_is_idempotent() {
        let (scheduler, sync, source) = setup().await;
        sync.resolve(12345).await.unwrap();

        let handle = scheduler.subscribe(12345).await.unwrap();
        assert!(scheduler.cancel(&handle).await.unwrap());
        assert!(!scheduler.cancel(&handle).await.unwrap());

        let calls_after_cancel = source.calls();
        tokio::time::sleep(TICK * 3).await;

        assert_eq!(source.calls(), calls_after_cancel);
        assert_eq!(scheduler.job_count().await, 0);
        assert!(sync.store().list_subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_with_stale_handle_is_noop() {
        let (scheduler, sync, _source) = setup().await;
        sync.resolve(12345).await.unwrap();

        let handle = scheduler.subscribe(12345).await.unwrap();
        let stale = SubscriptionHandle {
            subscription_id: Uuid::new_v4(),
            ..handle.clone()
        };

        assert!(!scheduler.cancel(&stale).await.unwrap());
        assert_eq!(scheduler.job_count().await, 1);

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_idempotent_and_blocks_new_subscriptions() {
        let (scheduler, sync, _source) = setup().await;
        sync.resolve(12345).await.unwrap();
        scheduler.subscribe(12345).await.unwrap();

        scheduler.shutdown().await;
        scheduler.shutdown().await;

        assert_eq!(scheduler.job_count().await, 0);
        assert!(matches!(
            scheduler.subscribe(12345).await,
            Err(ScheduleError::ShutDown)
        ));
        // Persisted for the next process
        assert_eq!(sync.store().list_subscriptions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_restores_persisted_subscriptions() {
        let (scheduler, sync, _source) = setup().await;
        sync.resolve(12345).await.unwrap();
        sync.store().insert_subscription(12345).await.unwrap();

        let restored = scheduler.start().await.unwrap();

        assert_eq!(restored, 1);
        let listed = scheduler.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].artikul, 12345);

        scheduler.shutdown().await;
    }
}
