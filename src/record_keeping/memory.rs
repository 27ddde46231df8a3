//! In-memory record keeper for tests and local runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::RecordKeepingError;
use super::{ConversionResult, ConversionSubject, RecordKeeper};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKeepingCall {
    Started(ConversionSubject),
    Finished(ConversionSubject, ConversionResult),
}

/// Records every call; individual calls can be made to fail
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordKeeper {
    calls: Arc<Mutex<Vec<RecordKeepingCall>>>,
    failing_starts: Arc<AtomicUsize>,
    failing_finishes: Arc<AtomicUsize>,
}

impl InMemoryRecordKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` start calls
    pub fn fail_next_starts(&self, count: usize) {
        self.failing_starts.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` finish calls
    pub fn fail_next_finishes(&self, count: usize) {
        self.failing_finishes.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordKeepingCall> {
        self.calls.lock().clone()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn push(&self, call: RecordKeepingCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl RecordKeeper for InMemoryRecordKeeper {
    async fn conversion_started(&self, subject: &ConversionSubject) -> Result<(), RecordKeepingError> {
        if Self::take_failure(&self.failing_starts) {
            return Err(RecordKeepingError::request(
                "conversion_started",
                "injected failure",
            ));
        }
        self.push(RecordKeepingCall::Started(subject.clone()));
        Ok(())
    }

    async fn conversion_finished(
        &self,
        subject: &ConversionSubject,
        result: &ConversionResult,
    ) -> Result<(), RecordKeepingError> {
        if Self::take_failure(&self.failing_finishes) {
            return Err(RecordKeepingError::request(
                "conversion_finished",
                "injected failure",
            ));
        }
        self.push(RecordKeepingCall::Finished(subject.clone(), result.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::time::Duration;

    fn subject() -> ConversionSubject {
        ConversionSubject {
            bucket: "alice".to_string(),
            key: "a.root".to_string(),
            size: 1,
            etag: "e".to_string(),
            event_time: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_failures_are_consumed_one_at_a_time() {
        let keeper = InMemoryRecordKeeper::new();
        keeper.fail_next_starts(1);

        assert!(keeper.conversion_started(&subject()).await.is_err());
        assert!(keeper.conversion_started(&subject()).await.is_ok());

        let result = ConversionResult::success(0, 1, Duration::from_millis(1));
        keeper.conversion_finished(&subject(), &result).await.unwrap();

        assert_eq!(
            keeper.calls(),
            vec![
                RecordKeepingCall::Started(subject()),
                RecordKeepingCall::Finished(subject(), result),
            ]
        );
    }

    #[tokio::test]
    async fn test_calls_survive_a_panicking_holder() {
        let keeper = InMemoryRecordKeeper::new();
        keeper.conversion_started(&subject()).await.unwrap();

        let calls = keeper.calls.clone();
        let panicked = std::thread::spawn(move || {
            let _guard = calls.lock();
            panic!("holder panicked");
        })
        .join();
        assert!(panicked.is_err());

        keeper.conversion_started(&subject()).await.unwrap();
        assert_eq!(keeper.calls().len(), 2);
    }
}
