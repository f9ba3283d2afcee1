//! Asynchronous click ingestion pipeline.
//!
//! Clicks are admitted one at a time into a bounded queue and flushed as
//! batches to storage by a single background task. Admission is strictly
//! non-blocking: a full queue rejects the click immediately, which is the
//! service's only backpressure mechanism, and callers should treat that
//! rejection as transient and retryable.
//!
//! The flusher is the sole consumer of the queue and the sole owner of the
//! flush decision. It waits on one `select!` point with two triggers: the
//! pending batch reaching `batch_size`, or the `batch_timeout` ticker firing
//! with a non-empty batch. Either way at most one flush is in flight.
//! A flush runs under its own deadline, detached from whatever request
//! admitted the events; once dequeued, a batch is either persisted or
//! logged and dropped, never re-enqueued.

use crate::clicks::ClickEvent;
use crate::storage::ClickStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tonic::Status;
use tracing::{debug, error};

/// Construction-time pipeline parameters. Fixed once the pipeline is spawned.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of admitted-but-unflushed clicks
    pub queue_capacity: usize,
    /// Flush as soon as this many clicks are pending
    pub batch_size: usize,
    /// Flush whatever is pending at this interval
    pub batch_timeout: Duration,
    /// Deadline for a single flush against the store
    pub flush_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 5000,
            batch_size: 500,
            batch_timeout: Duration::from_millis(500),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle to a running ingestion pipeline.
pub struct ClickPipeline {
    tx: mpsc::Sender<ClickEvent>,
    flusher: JoinHandle<()>,
}

impl ClickPipeline {
    /// Spawns the background flusher and returns the admission handle.
    pub fn spawn(store: Arc<dyn ClickStore>, config: PipelineConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let flusher = tokio::spawn(run_flusher(rx, store, config));
        Self { tx, flusher }
    }

    /// Admits one click event without blocking.
    ///
    /// Returns `ResourceExhausted` when the queue is full and `Cancelled`
    /// when the pipeline has shut down. Enqueueing is the only side effect
    /// visible to the caller; persistence happens later in the background.
    pub fn submit(&self, event: ClickEvent) -> Result<(), Status> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Status::resource_exhausted("click queue is full")),
            Err(TrySendError::Closed(_)) => Err(Status::cancelled("click pipeline is shut down")),
        }
    }

    /// Stops admission and drains the queue: already-admitted clicks are
    /// flushed before the flusher exits.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.flusher.await {
            error!(error = %e, "click flusher task failed");
        }
    }
}

async fn run_flusher(
    mut rx: mpsc::Receiver<ClickEvent>,
    store: Arc<dyn ClickStore>,
    config: PipelineConfig,
) {
    let mut batch: Vec<ClickEvent> = Vec::with_capacity(config.batch_size);
    let mut ticker = tokio::time::interval(config.batch_timeout);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(event) => {
                    batch.push(event);
                    if batch.len() >= config.batch_size {
                        flush(&store, &mut batch, config.flush_timeout).await;
                    }
                }
                None => {
                    // All senders are gone; flush the remainder and stop.
                    flush(&store, &mut batch, config.flush_timeout).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(&store, &mut batch, config.flush_timeout).await;
                }
            }
        }
    }
}

/// Flushes the pending batch under its own deadline. Failures and timeouts
/// are logged and the batch is dropped; delivery is at-most-once.
async fn flush(store: &Arc<dyn ClickStore>, batch: &mut Vec<ClickEvent>, deadline: Duration) {
    if batch.is_empty() {
        return;
    }

    let events = std::mem::take(batch);
    let batch_len = events.len();
    debug!(batch_len, "flushing click batch");

    match tokio::time::timeout(deadline, store.save_batch(events)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(batch_len, error = %e, "failed to save click batch, dropping it"),
        Err(_) => error!(batch_len, "click batch flush timed out, dropping it"),
    }
}
