//! Two-tier storage backend splitting reads at the retention boundary.
//!
//! Writes go to the durable tier first and are mirrored into the cache;
//! reads are partitioned at `now - retention_secs` into a historical
//! sub-window served by the durable tier and a recent sub-window served by
//! the cache, queried concurrently and merged into one hourly series.
//!
//! The two tiers are not equals: the durable tier is the system of record,
//! so its failures abort the call, while cache failures only cost freshness
//! and are logged and absorbed.

use crate::clicks::{hour_start, ClickEvent, HourlyBucket};
use crate::storage::ClickStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tonic::Status;
use tracing::{debug, warn};

/// Two-tier click storage with a short-retention cache in front of a
/// durable store.
pub struct TieredBackend {
    /// Fast short-retention tier (recent data)
    cache: Arc<dyn ClickStore>,
    /// Durable tier (historical data, system of record)
    store: Arc<dyn ClickStore>,
    /// Width of the recent window in seconds; matches the cache entry TTL
    retention_secs: i64,
}

impl TieredBackend {
    pub fn new(cache: Arc<dyn ClickStore>, store: Arc<dyn ClickStore>, retention_secs: i64) -> Self {
        Self {
            cache,
            store,
            retention_secs,
        }
    }
}

/// Merges the two tiers' partial results into one hourly series.
///
/// Buckets are grouped by `(banner_id, hour_start)`; a key present in both
/// inputs has its counts summed, never overwritten. The hour straddling the
/// retention boundary legitimately arrives from both tiers with partial
/// counts, which is why summing is required. The merged set is sorted
/// ascending by hour.
pub fn merge_hourly(historical: Vec<HourlyBucket>, recent: Vec<HourlyBucket>) -> Vec<HourlyBucket> {
    let mut merged: HashMap<(i64, i64), i64> = HashMap::new();
    for bucket in historical.into_iter().chain(recent) {
        *merged
            .entry((bucket.banner_id, hour_start(bucket.hour_start)))
            .or_insert(0) += bucket.count;
    }

    let mut buckets: Vec<HourlyBucket> = merged
        .into_iter()
        .map(|((banner_id, hour_start), count)| HourlyBucket {
            banner_id,
            hour_start,
            count,
        })
        .collect();
    buckets.sort_by_key(|b| (b.hour_start, b.banner_id));
    buckets
}

#[async_trait]
impl ClickStore for TieredBackend {
    /// Initializes both tiers.
    async fn init(&self) -> Result<(), Status> {
        self.store.init().await?;
        self.cache.init().await?;
        Ok(())
    }

    /// Persists the batch durably, then mirrors it into the cache.
    ///
    /// The mirror write is best-effort: its error is logged and discarded
    /// here, at this single call site, so cache outages never fail ingestion.
    async fn save_batch(&self, events: Vec<ClickEvent>) -> Result<(), Status> {
        self.store.save_batch(events.clone()).await?;

        if let Err(e) = self.cache.save_batch(events).await {
            warn!(error = %e, "failed to mirror click batch into cache");
        }

        Ok(())
    }

    /// Splits `[from, to)` at the retention boundary and queries the
    /// applicable tiers concurrently.
    ///
    /// The sub-windows are contiguous and non-overlapping: the cache serves
    /// `[max(from, boundary), to)` and the durable store serves
    /// `[from, min(to, boundary))`. A window entirely on one side issues
    /// only that tier's sub-query. A historical failure is the call's
    /// failure; a recent failure degrades to historical-only results.
    async fn hourly_stats(
        &self,
        banner_id: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<HourlyBucket>, Status> {
        if from == to {
            return Ok(Vec::new());
        }

        let boundary = chrono::Utc::now().timestamp() - self.retention_secs;

        let recent = async {
            if to > boundary {
                Some(self.cache.hourly_stats(banner_id, from.max(boundary), to).await)
            } else {
                None
            }
        };
        let historical = async {
            if from < boundary {
                Some(self.store.hourly_stats(banner_id, from, to.min(boundary)).await)
            } else {
                None
            }
        };

        let (recent, historical) = futures::join!(recent, historical);

        let historical = match historical {
            Some(result) => result?,
            None => Vec::new(),
        };
        let recent = match recent {
            Some(Ok(buckets)) => buckets,
            Some(Err(e)) => {
                warn!(banner_id, error = %e, "cache tier query failed, serving historical data only");
                Vec::new()
            }
            None => Vec::new(),
        };

        debug!(
            banner_id,
            historical = historical.len(),
            recent = recent.len(),
            "merging tiered stats"
        );
        Ok(merge_hourly(historical, recent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use std::sync::Mutex;

    mock! {
        pub Store {}

        #[async_trait]
        impl ClickStore for Store {
            async fn init(&self) -> Result<(), Status>;
            async fn save_batch(&self, events: Vec<ClickEvent>) -> Result<(), Status>;
            async fn hourly_stats(
                &self,
                banner_id: i64,
                from: i64,
                to: i64,
            ) -> Result<Vec<HourlyBucket>, Status>;
        }
    }

    fn bucket(banner_id: i64, hour_start: i64, count: i64) -> HourlyBucket {
        HourlyBucket {
            banner_id,
            hour_start,
            count,
        }
    }

    const RETENTION: i64 = 24 * 3600;

    #[test]
    fn merge_sums_shared_hours_and_sorts() {
        // Boundary scenario: the historical tier already counted part of an
        // hour that the cache also covers.
        let t = 1_000 * 3600;
        let historical = vec![bucket(1, t - 3 * 3600, 5)];
        let recent = vec![bucket(1, t - 3 * 3600, 2), bucket(1, t - 3600, 1)];

        let merged = merge_hourly(historical, recent);
        assert_eq!(merged, vec![bucket(1, t - 3 * 3600, 7), bucket(1, t - 3600, 1)]);
    }

    #[test]
    fn merge_is_commutative_for_disjoint_keys() {
        let a = vec![bucket(1, 3600, 4)];
        let b = vec![bucket(1, 7200, 9), bucket(2, 3600, 1)];

        assert_eq!(merge_hourly(a.clone(), b.clone()), merge_hourly(b, a));
    }

    #[test]
    fn merge_truncates_stray_timestamps() {
        // An input carrying a mid-hour timestamp still lands in its hour.
        let merged = merge_hourly(vec![bucket(1, 7200, 5)], vec![bucket(1, 7261, 2)]);
        assert_eq!(merged, vec![bucket(1, 7200, 7)]);
    }

    #[test]
    fn merge_of_empty_inputs_is_empty() {
        assert!(merge_hourly(Vec::new(), Vec::new()).is_empty());
    }

    #[tokio::test]
    async fn straddling_window_queries_both_tiers_contiguously() {
        let now = chrono::Utc::now().timestamp();
        let from = now - 2 * RETENTION;
        let to = now;

        let cache_window = Arc::new(Mutex::new(None));
        let store_window = Arc::new(Mutex::new(None));

        let mut cache = MockStore::new();
        let seen = cache_window.clone();
        cache
            .expect_hourly_stats()
            .times(1)
            .returning(move |_, from, to| {
                *seen.lock().unwrap() = Some((from, to));
                Ok(Vec::new())
            });

        let mut store = MockStore::new();
        let seen = store_window.clone();
        store
            .expect_hourly_stats()
            .times(1)
            .returning(move |_, from, to| {
                *seen.lock().unwrap() = Some((from, to));
                Ok(Vec::new())
            });

        let tiered = TieredBackend::new(Arc::new(cache), Arc::new(store), RETENTION);
        tiered.hourly_stats(1, from, to).await.unwrap();

        let (recent_from, recent_to) = cache_window.lock().unwrap().unwrap();
        let (historical_from, historical_to) = store_window.lock().unwrap().unwrap();

        // Sub-windows are contiguous, non-overlapping and cover [from, to).
        assert_eq!(historical_from, from);
        assert_eq!(recent_to, to);
        assert_eq!(historical_to, recent_from);
        // The split point sits at the retention boundary.
        assert!((recent_from - (now - RETENTION)).abs() <= 5);
    }

    #[tokio::test]
    async fn old_window_skips_the_cache_tier() {
        let now = chrono::Utc::now().timestamp();
        let from = now - 3 * RETENTION;
        let to = now - 2 * RETENTION;

        // No expectation on the cache: any call panics the test.
        let cache = MockStore::new();
        let mut store = MockStore::new();
        store
            .expect_hourly_stats()
            .times(1)
            .returning(move |_, f, t| {
                assert_eq!((f, t), (from, to));
                Ok(vec![bucket(1, hour_start(f), 3)])
            });

        let tiered = TieredBackend::new(Arc::new(cache), Arc::new(store), RETENTION);
        let buckets = tiered.hourly_stats(1, from, to).await.unwrap();
        assert_eq!(buckets.len(), 1);
    }

    #[tokio::test]
    async fn fresh_window_skips_the_durable_tier() {
        let now = chrono::Utc::now().timestamp();
        let from = now - 3600;
        let to = now;

        let mut cache = MockStore::new();
        cache
            .expect_hourly_stats()
            .times(1)
            .returning(move |_, f, t| {
                assert_eq!((f, t), (from, to));
                Ok(Vec::new())
            });
        let store = MockStore::new();

        let tiered = TieredBackend::new(Arc::new(cache), Arc::new(store), RETENTION);
        assert!(tiered.hourly_stats(1, from, to).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn future_window_yields_empty_result_without_error() {
        let now = chrono::Utc::now().timestamp();
        let from = now + 3600;
        let to = now + 7200;

        let mut cache = MockStore::new();
        cache
            .expect_hourly_stats()
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));
        let store = MockStore::new();

        let tiered = TieredBackend::new(Arc::new(cache), Arc::new(store), RETENTION);
        assert!(tiered.hourly_stats(1, from, to).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_window_issues_no_queries() {
        let cache = MockStore::new();
        let store = MockStore::new();
        let now = chrono::Utc::now().timestamp();

        let tiered = TieredBackend::new(Arc::new(cache), Arc::new(store), RETENTION);
        assert!(tiered.hourly_stats(1, now, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_failure_degrades_to_historical_data() {
        let now = chrono::Utc::now().timestamp();
        let from = now - 2 * RETENTION;

        let mut cache = MockStore::new();
        cache
            .expect_hourly_stats()
            .returning(|_, _, _| Err(Status::unavailable("cache down")));
        let mut store = MockStore::new();
        store
            .expect_hourly_stats()
            .returning(|_, f, _| Ok(vec![bucket(1, hour_start(f), 8)]));

        let tiered = TieredBackend::new(Arc::new(cache), Arc::new(store), RETENTION);
        let buckets = tiered.hourly_stats(1, from, now).await.unwrap();
        assert_eq!(buckets[0].count, 8);
    }

    #[tokio::test]
    async fn durable_failure_is_fatal() {
        let now = chrono::Utc::now().timestamp();
        let from = now - 2 * RETENTION;

        let mut cache = MockStore::new();
        cache
            .expect_hourly_stats()
            .returning(|_, f, _| Ok(vec![bucket(1, hour_start(f), 2)]));
        let mut store = MockStore::new();
        store
            .expect_hourly_stats()
            .returning(|_, _, _| Err(Status::unavailable("database down")));

        let tiered = TieredBackend::new(Arc::new(cache), Arc::new(store), RETENTION);
        let err = tiered.hourly_stats(1, from, now).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn save_batch_mirrors_into_cache_and_swallows_cache_errors() {
        let events = vec![ClickEvent {
            banner_id: 1,
            timestamp: 100,
            count: 1,
        }];

        let mut store = MockStore::new();
        store.expect_save_batch().times(1).returning(|_| Ok(()));
        let mut cache = MockStore::new();
        cache
            .expect_save_batch()
            .times(1)
            .returning(|_| Err(Status::unavailable("cache down")));

        let tiered = TieredBackend::new(Arc::new(cache), Arc::new(store), RETENTION);
        tiered.save_batch(events).await.unwrap();
    }

    #[tokio::test]
    async fn save_batch_fails_fast_when_durable_write_fails() {
        let mut store = MockStore::new();
        store
            .expect_save_batch()
            .times(1)
            .returning(|_| Err(Status::unavailable("database down")));
        // The mirror write must not happen when the durable write failed.
        let cache = MockStore::new();

        let tiered = TieredBackend::new(Arc::new(cache), Arc::new(store), RETENTION);
        let err = tiered
            .save_batch(vec![ClickEvent {
                banner_id: 1,
                timestamp: 100,
                count: 1,
            }])
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unavailable);
    }
}
