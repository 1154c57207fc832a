//! Waiting for client-side rendering
//!
//! The lesson table is filled in by page scripts after navigation finishes,
//! and nothing signals when it is done. Readiness is therefore a pluggable
//! capability: the default polls for a selector and then sleeps for a
//! settle delay.
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::ExtractError;

/// Something that can be asked whether a selector currently matches.
///
/// `Ok(false)` means the page answered and nothing matched; errors mean the
/// page could not be asked at all.
#[async_trait]
pub trait DomProbe: Send + Sync {
    async fn is_present(&self, selector: &str) -> Result<bool, ExtractError>;
}

/// Blocks until a page is ready to be read
#[async_trait]
pub trait WaitForReady: Send + Sync {
    async fn wait_for_ready(
        &self,
        probe: &dyn DomProbe,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ExtractError>;
}

/// Poll for the selector, then give scripts a fixed settle delay
#[derive(Debug, Clone)]
pub struct PollingWait {
    poll_interval: Duration,
    settle_delay: Duration,
}

impl PollingWait {
    pub fn new(poll_interval: Duration, settle_delay: Duration) -> Self {
        Self {
            poll_interval,
            settle_delay,
        }
    }
}

#[async_trait]
impl WaitForReady for PollingWait {
    async fn wait_for_ready(
        &self,
        probe: &dyn DomProbe,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), ExtractError> {
        let deadline = Instant::now() + timeout;

        loop {
            if probe.is_present(selector).await? {
                break;
            }
            if Instant::now() >= deadline {
                return Err(ExtractError::NotReady {
                    selector: selector.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        debug!("`{}` present, settling for {:?}", selector, self.settle_delay);
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports the selector present from the n-th probe onwards
    struct AppearsAfter {
        calls: AtomicUsize,
        after: usize,
    }

    #[async_trait]
    impl DomProbe for AppearsAfter {
        async fn is_present(&self, _selector: &str) -> Result<bool, ExtractError> {
            Ok(self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.after)
        }
    }

    struct DeadPage;

    #[async_trait]
    impl DomProbe for DeadPage {
        async fn is_present(&self, _selector: &str) -> Result<bool, ExtractError> {
            Err(ExtractError::Extraction("target closed".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_selector_appears() {
        let probe = AppearsAfter {
            calls: AtomicUsize::new(0),
            after: 3,
        };
        let wait = PollingWait::new(Duration::from_millis(100), Duration::from_secs(2));

        let started = Instant::now();
        wait.wait_for_ready(&probe, "tr", Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        // two polling sleeps plus the settle delay
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2200));
        assert!(elapsed < Duration::from_millis(2300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_selector_never_appears() {
        let probe = AppearsAfter {
            calls: AtomicUsize::new(0),
            after: usize::MAX,
        };
        let wait = PollingWait::new(Duration::from_millis(250), Duration::ZERO);

        let err = wait
            .wait_for_ready(&probe, "table tr", Duration::from_secs(1))
            .await
            .unwrap_err();

        match err {
            ExtractError::NotReady { selector, timeout } => {
                assert_eq!(selector, "table tr");
                assert_eq!(timeout, Duration::from_secs(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_error_is_returned_without_waiting() {
        let wait = PollingWait::new(Duration::from_millis(250), Duration::from_secs(2));

        let started = Instant::now();
        let err = wait
            .wait_for_ready(&DeadPage, "tr", Duration::from_secs(60))
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::Extraction(ref message) if message == "target closed"));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
