use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{is_newer, FetchError, FetchOutcome, StockSource};

/// Polls an inner source until it reports data newer than `since`, giving up
/// after `max_attempts`.
pub struct RetryUntilNewer<S> {
    inner: S,
    max_attempts: u32,
    delay: Duration,
}

impl<S: StockSource> RetryUntilNewer<S> {
    pub fn new(inner: S, max_attempts: u32, delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

#[async_trait]
impl<S: StockSource> StockSource for RetryUntilNewer<S> {
    fn name(&self) -> &'static str {
        "retry-until-newer"
    }

    async fn fetch(&self, since: Option<DateTime<Utc>>) -> Result<FetchOutcome, FetchError> {
        let mut last_error = None;
        let mut answered = false;

        for attempt in 1..=self.max_attempts {
            match self.inner.fetch(since).await {
                Ok(FetchOutcome::Snapshot(snapshot)) if is_newer(&snapshot, since) => {
                    info!(attempt, updated_at = %snapshot.updated_at, "newer stock found");
                    return Ok(FetchOutcome::Snapshot(snapshot));
                }
                Ok(_) => {
                    answered = true;
                    debug!(attempt, max_attempts = self.max_attempts, "stock not updated yet");
                }
                Err(err) => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %err, "stock attempt failed");
                    last_error = Some(err);
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        match last_error {
            Some(err) if !answered => Err(err),
            _ => {
                info!(max_attempts = self.max_attempts, "no newer stock after retries");
                Ok(FetchOutcome::NoNewData)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;
    use stock_model::StockSnapshot;

    /// Replays a fixed script of responses, then repeats the last one.
    struct Scripted {
        script: Mutex<VecDeque<Result<i64, u16>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(script: Vec<Result<i64, u16>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl StockSource for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(&self, _since: Option<DateTime<Utc>>) -> Result<FetchOutcome, FetchError> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            };
            match next.expect("script should not be empty") {
                Ok(secs) => Ok(FetchOutcome::Snapshot(Arc::new(StockSnapshot::new(
                    Utc.timestamp_opt(secs, 0).unwrap(),
                )))),
                Err(code) => Err(FetchError::Status(code)),
            }
        }
    }

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Some(Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_strictly_newer_snapshot() {
        let inner = Arc::new(Scripted::new(vec![Ok(100), Ok(100), Ok(160)]));
        let source = RetryUntilNewer::new(inner.clone(), 5, Duration::from_secs(10));

        let outcome = source.fetch(at(100)).await.expect("fetch");
        let snapshot = outcome.snapshot().expect("newer snapshot");
        assert_eq!(snapshot.updated_at.timestamp(), 160);
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_no_new_data() {
        let inner = Arc::new(Scripted::new(vec![Ok(100)]));
        let source = RetryUntilNewer::new(inner.clone(), 4, Duration::from_secs(10));

        let outcome = source.fetch(at(100)).await.expect("fetch");
        assert!(outcome.snapshot().is_none());
        assert_eq!(inner.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let inner = Arc::new(Scripted::new(vec![Err(502), Ok(200)]));
        let source = RetryUntilNewer::new(inner.clone(), 3, Duration::from_secs(1));

        let outcome = source.fetch(at(100)).await.expect("fetch");
        assert!(outcome.snapshot().is_some());
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_errors_surface_the_last_error() {
        let inner = Arc::new(Scripted::new(vec![Err(500)]));
        let source = RetryUntilNewer::new(inner.clone(), 3, Duration::from_secs(1));

        let err = source.fetch(at(100)).await.expect_err("all attempts failed");
        assert!(matches!(err, FetchError::Status(500)));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn without_since_any_snapshot_is_newer() {
        let inner = Arc::new(Scripted::new(vec![Ok(1)]));
        let source = RetryUntilNewer::new(inner.clone(), 3, Duration::from_secs(1));

        assert!(source.fetch(None).await.expect("fetch").snapshot().is_some());
        assert_eq!(inner.calls(), 1);
    }
}
