//! Core click-event and hourly-bucket types shared by all storage backends.

use serde::{Deserialize, Serialize};

/// Seconds per aggregation bucket.
pub const HOUR_SECS: i64 = 3600;

/// A single recorded banner click, the unit of ingestion.
///
/// Owned by the ingestion pipeline from admission until it is flushed to
/// durable storage as part of a batch. `count` is at least 1; the transport
/// layer records one click at a time but batched imports may carry more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickEvent {
    /// Banner the click belongs to
    pub banner_id: i64,
    /// Unix timestamp in seconds
    pub timestamp: i64,
    /// Number of clicks this event represents
    pub count: i64,
}

/// Aggregated click count for one banner within one clock hour.
///
/// The unit returned by stats queries. For a fixed `(banner_id, hour_start)`
/// at most one bucket exists in any result set; counts arriving for the same
/// hour from both storage tiers are summed during the merge step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyBucket {
    /// Banner the bucket belongs to
    pub banner_id: i64,
    /// Unix timestamp in seconds, truncated to the hour
    pub hour_start: i64,
    /// Total clicks within the hour
    pub count: i64,
}

/// Truncates a unix timestamp down to the start of its hour.
pub fn hour_start(timestamp: i64) -> i64 {
    timestamp - timestamp.rem_euclid(HOUR_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_start_truncates_within_hour() {
        assert_eq!(hour_start(7200), 7200);
        assert_eq!(hour_start(7201), 7200);
        assert_eq!(hour_start(10799), 7200);
        assert_eq!(hour_start(10800), 10800);
    }

    #[test]
    fn hour_start_is_idempotent() {
        let ts = 1_700_001_234;
        assert_eq!(hour_start(hour_start(ts)), hour_start(ts));
    }
}
