//! Service facade over the ingestion pipeline and tiered storage.
//!
//! This is the boundary the transport layer calls into: click recording
//! (admission into the pipeline plus the banner's running total) and
//! windowed hourly stats. Range validation happens here, before any
//! storage tier is touched.

use crate::clicks::{ClickEvent, HourlyBucket};
use crate::pipeline::ClickPipeline;
use crate::storage::ClickStore;
use std::sync::Arc;
use tonic::Status;
use tracing::debug;

pub struct ClickService {
    pipeline: ClickPipeline,
    store: Arc<dyn ClickStore>,
    /// Width of the running-total window in seconds
    retention_secs: i64,
}

impl ClickService {
    pub fn new(pipeline: ClickPipeline, store: Arc<dyn ClickStore>, retention_secs: i64) -> Self {
        Self {
            pipeline,
            store,
            retention_secs,
        }
    }

    /// Records one click for the banner and returns its updated total over
    /// the trailing retention window.
    ///
    /// The click itself is admitted fire-and-forget: once enqueued, the
    /// response does not wait for persistence. A saturated queue surfaces
    /// as `ResourceExhausted` and the click is not recorded.
    pub async fn record_click(&self, banner_id: i64) -> Result<i64, Status> {
        let now = chrono::Utc::now().timestamp();
        let buckets = self
            .store
            .hourly_stats(banner_id, now - self.retention_secs, now)
            .await?;
        let total: i64 = buckets.iter().map(|b| b.count).sum();

        self.pipeline.submit(ClickEvent {
            banner_id,
            timestamp: now,
            count: 1,
        })?;

        Ok(total + 1)
    }

    /// Hourly click totals for the banner over the half-open window
    /// `[from, to)`, merged across both storage tiers and sorted ascending.
    pub async fn stats(&self, banner_id: i64, from: i64, to: i64) -> Result<Vec<HourlyBucket>, Status> {
        if from > to {
            return Err(Status::invalid_argument("invalid time range: from is after to"));
        }

        debug!(banner_id, from, to, "stats query");
        self.store.hourly_stats(banner_id, from, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use async_trait::async_trait;

    struct FixedStore {
        buckets: Vec<HourlyBucket>,
    }

    #[async_trait]
    impl ClickStore for FixedStore {
        async fn init(&self) -> Result<(), Status> {
            Ok(())
        }

        async fn save_batch(&self, _events: Vec<ClickEvent>) -> Result<(), Status> {
            Ok(())
        }

        async fn hourly_stats(
            &self,
            _banner_id: i64,
            _from: i64,
            _to: i64,
        ) -> Result<Vec<HourlyBucket>, Status> {
            Ok(self.buckets.clone())
        }
    }

    fn service_over(buckets: Vec<HourlyBucket>) -> ClickService {
        let store = Arc::new(FixedStore { buckets });
        let pipeline = ClickPipeline::spawn(store.clone(), PipelineConfig::default());
        ClickService::new(pipeline, store, 24 * 3600)
    }

    #[tokio::test]
    async fn reversed_range_is_rejected_before_any_query() {
        let service = service_over(Vec::new());
        let err = service.stats(1, 100, 50).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn record_click_returns_running_total_plus_one() {
        let service = service_over(vec![
            HourlyBucket { banner_id: 1, hour_start: 0, count: 3 },
            HourlyBucket { banner_id: 1, hour_start: 3600, count: 2 },
        ]);
        assert_eq!(service.record_click(1).await.unwrap(), 6);
    }
}
