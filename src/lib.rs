/*!
# Clickstream: Banner Click Ingestion and Tiered Hourly Stats

Clickstream records per-banner click events and serves aggregated hourly
click counts over arbitrary time windows. Built on tokio, Redis and
PostgreSQL, it trades write latency against read freshness by splitting
data across two storage tiers.

## Key Features

### Asynchronous Ingestion
- Non-blocking click admission into a bounded in-memory queue
- A single background flusher batching clicks by size or timeout
- Transactional batch inserts into PostgreSQL with a best-effort mirror
  into the Redis counter cache
- Queue saturation surfaces as an immediate, retryable rejection

### Tiered Hourly Stats
- Queried windows split at the retention boundary (24h by default)
- Recent data served from Redis counters, historical data from PostgreSQL
- Both tiers queried concurrently, results merged into one ordered,
  deduplicated hourly series
- The durable tier is the system of record; cache failures only degrade
  freshness, never the call

### gRPC Serving
- `CounterService.Counter` records a click and returns the running total
- `StatsService.Stats` returns the hourly series for a window

## Usage

Basic usage example with programmatic configuration:

```rust,no_run
use clickstream_core::config::Settings;
use clickstream_core::pipeline::{ClickPipeline, PipelineConfig};
use clickstream_core::service::ClickService;
use clickstream_core::storage::{postgres::PostgresBackend, ClickStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::default();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.storage.pool_max)
        .connect(&settings.storage.dsn)
        .await?;
    let store: Arc<dyn ClickStore> = Arc::new(PostgresBackend::new(pool));
    store.init().await?;

    let pipeline = ClickPipeline::spawn(store.clone(), PipelineConfig::default());
    let service = ClickService::new(pipeline, store, settings.cache.ttl_secs as i64);

    // Hand `service` to the gRPC layer...
    let _ = service;
    Ok(())
}
```

For detailed configuration options, see the [`config`](crate::config)
module; for storage backend details, see [`storage`](crate::storage).
*/

pub mod clicks;
pub mod config;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod storage;

pub use clicks::{ClickEvent, HourlyBucket};
pub use pipeline::{ClickPipeline, PipelineConfig};
pub use service::ClickService;
pub use storage::ClickStore;
