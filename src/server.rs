//! gRPC surface for click recording and stats queries.
//!
//! Two services mirror the two operations: `CounterService.Counter` records
//! a click and returns the banner's running total, `StatsService.Stats`
//! returns the hourly series for a window. Handlers stay thin: they map
//! protobuf messages to the service facade and pass `tonic::Status` errors
//! straight through.

use crate::service::ClickService;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub mod pb {
    pub mod counter {
        tonic::include_proto!("counter");
    }
    pub mod stats {
        tonic::include_proto!("stats");
    }
}

use pb::counter::counter_service_server::CounterService;
use pb::counter::{CounterRequest, CounterResponse};
use pb::stats::stats_service_server::StatsService;
use pb::stats::{stats_response, StatsRequest, StatsResponse};

pub use pb::counter::counter_service_server::CounterServiceServer;
pub use pb::stats::stats_service_server::StatsServiceServer;

pub struct CounterApi {
    service: Arc<ClickService>,
}

impl CounterApi {
    pub fn new(service: Arc<ClickService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl CounterService for CounterApi {
    async fn counter(
        &self,
        request: Request<CounterRequest>,
    ) -> Result<Response<CounterResponse>, Status> {
        let req = request.into_inner();
        let total_clicks = self.service.record_click(req.banner_id).await?;
        Ok(Response::new(CounterResponse { total_clicks }))
    }
}

pub struct StatsApi {
    service: Arc<ClickService>,
}

impl StatsApi {
    pub fn new(service: Arc<ClickService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl StatsService for StatsApi {
    async fn stats(
        &self,
        request: Request<StatsRequest>,
    ) -> Result<Response<StatsResponse>, Status> {
        let req = request.into_inner();
        let buckets = self
            .service
            .stats(req.banner_id, req.ts_from, req.ts_to)
            .await?;

        let stats = buckets
            .into_iter()
            .map(|b| stats_response::ClickStats {
                timestamp: b.hour_start,
                count: b.count as i32,
            })
            .collect();
        Ok(Response::new(StatsResponse { stats }))
    }
}
