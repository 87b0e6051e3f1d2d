use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use morpho::providers::retry::{RetryConfig, RetryingTransformProvider};
use morpho::types::{
    Requester, ResultLocation, TransformationKind, TransformationRequest,
};
use morpho::{MorphoError, Result, TransformProvider};

/// Mock provider that fails N times then succeeds.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> MorphoError,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> MorphoError) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            total_calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransformProvider for FailThenSucceed {
    fn name(&self) -> &str {
        "flaky"
    }

    fn supports(&self, _kind: TransformationKind) -> bool {
        true
    }

    fn timeout(&self, _kind: TransformationKind) -> Duration {
        Duration::from_secs(5)
    }

    async fn submit(
        &self,
        _request: &TransformationRequest,
        _budget: Duration,
    ) -> Result<ResultLocation> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }
        Ok(ResultLocation(
            "https://replicate.delivery/out/flaky.jpg".to_string(),
        ))
    }
}

fn cartoon_request() -> TransformationRequest {
    TransformationRequest::new(
        TransformationKind::Cartoon,
        Requester::metered("user-1"),
        "https://cdn.test/portrait.jpg",
        None,
        Default::default(),
        None,
    )
    .unwrap()
}

fn fast_retries(max_attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .max_attempts(max_attempts)
        .initial_delay(Duration::from_millis(1))
        .jitter(false)
}

#[tokio::test]
async fn retries_on_transient_error_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2, || MorphoError::RateLimited {
        retry_after: None,
    }));
    let provider = RetryingTransformProvider::new(inner.clone(), fast_retries(3));

    let result = provider
        .submit(&cartoon_request(), Duration::from_secs(5))
        .await;

    assert!(result.is_ok());
    assert_eq!(inner.call_count(), 3); // 2 failures + 1 success
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let inner = Arc::new(FailThenSucceed::new(10, || {
        MorphoError::VendorUnavailable("service melted".into())
    }));
    let provider = RetryingTransformProvider::new(inner.clone(), fast_retries(3));

    let result = provider
        .submit(&cartoon_request(), Duration::from_secs(5))
        .await;

    assert!(matches!(result, Err(MorphoError::VendorUnavailable(_))));
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test]
async fn does_not_retry_vendor_rejections() {
    let inner = Arc::new(FailThenSucceed::new(1, || {
        MorphoError::VendorRejected("face not detected".into())
    }));
    let provider = RetryingTransformProvider::new(inner.clone(), fast_retries(5));

    let result = provider
        .submit(&cartoon_request(), Duration::from_secs(5))
        .await;

    assert!(result.is_err());
    assert_eq!(inner.call_count(), 1); // no retry
}

#[tokio::test]
async fn does_not_retry_timeouts() {
    // A timed-out vendor already burned its budget; retrying it would
    // starve the rest of the chain.
    let inner = Arc::new(FailThenSucceed::new(1, || MorphoError::VendorTimeout {
        timeout: Some(Duration::from_secs(5)),
    }));
    let provider = RetryingTransformProvider::new(inner.clone(), fast_retries(5));

    let result = provider
        .submit(&cartoon_request(), Duration::from_secs(5))
        .await;

    assert!(matches!(result, Err(MorphoError::VendorTimeout { .. })));
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test]
async fn respects_retry_after_duration() {
    let inner = Arc::new(FailThenSucceed::new(1, || MorphoError::RateLimited {
        retry_after: Some(Duration::from_millis(50)),
    }));
    let provider = RetryingTransformProvider::new(inner.clone(), fast_retries(2));

    let start = std::time::Instant::now();
    let result = provider
        .submit(&cartoon_request(), Duration::from_secs(5))
        .await;
    let elapsed = start.elapsed();

    assert!(result.is_ok());
    // Should have waited at least 50ms (the retry_after), not 1ms (initial_delay)
    assert!(elapsed >= Duration::from_millis(40)); // some tolerance
}

#[tokio::test]
async fn decorator_preserves_the_inner_identity() {
    let inner = Arc::new(FailThenSucceed::new(0, || MorphoError::NoProvider));
    let provider = RetryingTransformProvider::new(inner, RetryConfig::default());

    assert_eq!(provider.name(), "flaky");
    assert!(provider.supports(TransformationKind::Cartoon));
    assert_eq!(
        provider.timeout(TransformationKind::Cartoon),
        Duration::from_secs(5)
    );
}
