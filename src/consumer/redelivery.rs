//! Redelivery limits.
//!
//! Two independent ceilings stop a message from cycling forever:
//!
//! - Conversion failures are counted locally per object identity
//!   (`bucket/key@etag`). Only failed conversions count; requeues for a
//!   missing object or a transfer fault do not. The count is lost on restart.
//! - The broker's delivery count, when the queue reports one, is compared
//!   against an optional delivery limit. This ceiling survives restarts and
//!   covers every kind of requeue.

use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct RedeliveryTracker {
    failures: DashMap<String, u32>,
    limit: Option<u32>,
    delivery_limit: Option<u32>,
}

impl RedeliveryTracker {
    /// Tracker that gives up after `limit` failures; `None` never gives up
    pub fn new(limit: Option<u32>) -> Self {
        Self {
            failures: DashMap::new(),
            limit,
            delivery_limit: None,
        }
    }

    /// Reject any message the broker has delivered `delivery_limit` times
    pub fn with_delivery_limit(mut self, delivery_limit: Option<u32>) -> Self {
        self.delivery_limit = delivery_limit;
        self
    }

    pub fn limit(&self) -> Option<u32> {
        self.limit
    }

    pub fn delivery_limit(&self) -> Option<u32> {
        self.delivery_limit
    }

    /// Count one more failed conversion of `identity`, returning the total
    pub fn record_failure(&self, identity: &str) -> u32 {
        let mut entry = self.failures.entry(identity.to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
        let attempts = *entry;
        debug!(identity = %identity, attempts = attempts, limit = ?self.limit, "Conversion failure recorded");
        attempts
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.limit.is_some_and(|limit| attempts >= limit)
    }

    /// Whether a delivery with the broker-reported `delivery_count` may not be requeued again
    pub fn deliveries_exhausted(&self, delivery_count: Option<u32>) -> bool {
        match (self.delivery_limit, delivery_count) {
            (Some(limit), Some(count)) => count >= limit,
            _ => false,
        }
    }

    /// Forget `identity`, typically after it converted successfully
    pub fn clear(&self, identity: &str) {
        self.failures.remove(identity);
    }

    pub fn attempts(&self, identity: &str) -> u32 {
        self.failures.get(identity).map(|n| *n).unwrap_or(0)
    }

    /// Objects with at least one recorded failure
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_accumulate_until_limit() {
        let tracker = RedeliveryTracker::new(Some(3));
        assert_eq!(tracker.record_failure("b/k@e"), 1);
        assert!(!tracker.is_exhausted(1));
        assert_eq!(tracker.record_failure("b/k@e"), 2);
        assert_eq!(tracker.record_failure("b/k@e"), 3);
        assert!(tracker.is_exhausted(3));
        assert_eq!(tracker.attempts("other"), 0);
    }

    #[test]
    fn test_first_failure_ignores_earlier_deliveries() {
        let tracker = RedeliveryTracker::new(Some(5));
        assert_eq!(tracker.record_failure("b/k@e"), 1);
        assert!(!tracker.is_exhausted(tracker.attempts("b/k@e")));
    }

    #[test]
    fn test_delivery_limit() {
        let unlimited = RedeliveryTracker::new(Some(5));
        assert!(!unlimited.deliveries_exhausted(Some(1000)));

        let tracker = RedeliveryTracker::new(None).with_delivery_limit(Some(4));
        assert!(!tracker.deliveries_exhausted(None));
        assert!(!tracker.deliveries_exhausted(Some(3)));
        assert!(tracker.deliveries_exhausted(Some(4)));
        assert!(tracker.deliveries_exhausted(Some(9)));
    }

    #[test]
    fn test_clear_and_unbounded() {
        let tracker = RedeliveryTracker::new(None);
        for _ in 0..100 {
            tracker.record_failure("b/k@e");
        }
        assert!(!tracker.is_exhausted(tracker.attempts("b/k@e")));
        assert_eq!(tracker.tracked(), 1);

        tracker.clear("b/k@e");
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn test_distinct_etags_tracked_separately() {
        let tracker = RedeliveryTracker::new(Some(2));
        tracker.record_failure("b/k@v1");
        assert_eq!(tracker.record_failure("b/k@v2"), 1);
    }
}
