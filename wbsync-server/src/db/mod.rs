//! Database access for wbsync-server
//!
//! Schema lives in `wbsync_common::db`; this module holds the queries.

pub mod products;
pub mod subscriptions;

pub use products::{ProductStore, StoreError, StoreResult, UpsertOutcome};
pub use subscriptions::SubscriptionRecord;
