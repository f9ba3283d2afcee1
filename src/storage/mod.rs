//! Storage backends for click persistence and hourly aggregation.
//!
//! This module provides the storage tiers behind the stats service:
//! - `postgres`: durable storage, one row per click, hourly sums computed
//!   by a grouped SQL query. The system of record.
//! - `redis`: short-retention counter cache keyed per banner and second,
//!   serving the most recent day of data.
//! - `tiered`: splits each queried window at the retention boundary,
//!   queries both tiers concurrently and merges the results.
//!
//! Each backend implements the `ClickStore` trait, providing a consistent
//! interface for batch writes and hourly stats reads.

pub mod postgres;
pub mod redis;
pub mod tiered;

use crate::clicks::{ClickEvent, HourlyBucket};
use async_trait::async_trait;
use tonic::Status;

/// Storage backend trait for click data.
///
/// Both tiers (and the tiered composite over them) implement this trait.
/// Writes take whole batches; reads return hourly buckets ordered ascending
/// by hour over the half-open window `[from, to)`.
#[async_trait]
pub trait ClickStore: Send + Sync + 'static {
    /// Initialize the backend (create schema, verify connectivity).
    async fn init(&self) -> Result<(), Status>;

    /// Persist a batch of click events.
    async fn save_batch(&self, events: Vec<ClickEvent>) -> Result<(), Status>;

    /// Hourly click totals for one banner over `[from, to)`.
    async fn hourly_stats(
        &self,
        banner_id: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<HourlyBucket>, Status>;
}
