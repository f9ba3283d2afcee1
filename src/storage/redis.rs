//! Redis storage backend, the cache tier.
//!
//! Keeps one integer counter per `(banner, second)`, incremented atomically
//! on write and expiring `ttl_secs` after its last update. Reads scan the
//! banner's keys, fetch the counters in one round trip, and aggregate them
//! into hourly buckets. The cache tier is a best-effort accelerator: its
//! read and write failures are absorbed upstream, never surfaced to callers.
//!
//! # Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! url = "redis://127.0.0.1:6379/0"
//! ttl_secs = 86400
//! ```

use crate::clicks::{hour_start, ClickEvent, HourlyBucket};
use crate::storage::ClickStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tonic::Status;
use tracing::debug;

/// Short-retention counter cache backed by Redis.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
    ttl_secs: u64,
}

impl RedisBackend {
    pub fn new(manager: ConnectionManager, ttl_secs: u64) -> Self {
        Self { manager, ttl_secs }
    }
}

fn cache_error(context: &str, err: redis::RedisError) -> Status {
    Status::unavailable(format!("{}: {}", context, err))
}

fn counter_key(banner_id: i64, timestamp: i64) -> String {
    format!("banner:{}:{}", banner_id, timestamp)
}

/// Decodes `banner:{id}:{unix_second}` back into its parts.
/// Returns `None` for keys that do not match the layout.
fn parse_counter_key(key: &str) -> Option<(i64, i64)> {
    let mut parts = key.split(':');
    if parts.next() != Some("banner") {
        return None;
    }
    let banner_id = parts.next()?.parse().ok()?;
    let timestamp = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((banner_id, timestamp))
}

/// Groups per-second counter readings into hourly buckets over `[from, to)`,
/// sorted ascending by hour. Mirrors the durable tier's grouped query so the
/// two tiers hand identically shaped results to the merge step.
fn aggregate_hourly(banner_id: i64, counts: Vec<(i64, i64)>, from: i64, to: i64) -> Vec<HourlyBucket> {
    let mut hours: HashMap<i64, i64> = HashMap::new();
    for (timestamp, count) in counts {
        if timestamp < from || timestamp >= to {
            continue;
        }
        *hours.entry(hour_start(timestamp)).or_insert(0) += count;
    }

    let mut buckets: Vec<HourlyBucket> = hours
        .into_iter()
        .map(|(hour_start, count)| HourlyBucket {
            banner_id,
            hour_start,
            count,
        })
        .collect();
    buckets.sort_by_key(|b| b.hour_start);
    buckets
}

#[async_trait]
impl ClickStore for RedisBackend {
    async fn init(&self) -> Result<(), Status> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| cache_error("failed to ping cache", e))?;
        Ok(())
    }

    /// Increments one counter per event and refreshes its expiry, all in a
    /// single pipelined round trip.
    async fn save_batch(&self, events: Vec<ClickEvent>) -> Result<(), Status> {
        if events.is_empty() {
            return Ok(());
        }

        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        for event in &events {
            let key = counter_key(event.banner_id, event.timestamp);
            pipe.cmd("INCRBY").arg(&key).arg(event.count).ignore();
            pipe.cmd("EXPIRE").arg(&key).arg(self.ttl_secs).ignore();
        }

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| cache_error("failed to write click counters", e))
    }

    /// Scans the banner's counter keys, fetches their values in one MGET
    /// and aggregates whatever falls inside the window. Malformed keys and
    /// missing values are skipped rather than treated as fatal.
    async fn hourly_stats(
        &self,
        banner_id: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<HourlyBucket>, Status> {
        let mut conn = self.manager.clone();

        let pattern = format!("banner:{}:*", banner_id);
        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(&pattern)
                .await
                .map_err(|e| cache_error("failed to scan counter keys", e))?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        debug!(banner_id, keys = keys.len(), "cache scan");
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Option<i64>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error("failed to fetch click counters", e))?;

        let counts = keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| {
                let (_, timestamp) = parse_counter_key(key)?;
                Some((timestamp, value?))
            })
            .collect();

        Ok(aggregate_hourly(banner_id, counts, from, to))
    }
}
