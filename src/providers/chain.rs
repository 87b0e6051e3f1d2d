//! Fallback chain execution.
//!
//! A [`FallbackChain`] holds the providers for one transformation kind
//! in priority order (index 0 = tried first). Execution walks the chain
//! until a provider succeeds or a terminal error stops it.
//!
//! # Fallback triggers
//!
//! Every provider-side failure falls through to the next provider:
//! rejections, outages, rate limits, and timeouts alike. The one
//! terminal error is [`MorphoError::InvalidInput`], which no amount of
//! switching vendors can fix.
//!
//! # Budget enforcement
//!
//! Each attempt runs under `tokio::time::timeout` with the provider's
//! own per-kind budget, so a wedged vendor cannot stall the walk. The
//! retry decorator sits inside that window, which bounds the whole
//! request at the sum of the per-provider budgets.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::telemetry;
use crate::types::{
    AttemptOutcome, ProviderAttempt, ResultLocation, TransformationKind, TransformationRequest,
};
use crate::{MorphoError, Result};

use super::traits::TransformProvider;

/// The winning provider and its result, when a chain walk succeeds.
#[derive(Debug, Clone)]
pub struct ChainSuccess {
    pub location: ResultLocation,
    pub provider: String,
}

/// One complete walk down a chain: the per-provider attempt log plus
/// the final result. The log is populated on both paths so callers can
/// report what was tried even when everything failed.
#[derive(Debug)]
pub struct ChainRun {
    pub attempts: Vec<ProviderAttempt>,
    pub result: Result<ChainSuccess>,
}

/// Ordered providers for one transformation kind.
pub struct FallbackChain {
    kind: TransformationKind,
    providers: Vec<Arc<dyn TransformProvider>>,
}

impl FallbackChain {
    /// Build a chain from providers already filtered to this kind and
    /// ordered by priority.
    pub fn new(kind: TransformationKind, providers: Vec<Arc<dyn TransformProvider>>) -> Self {
        Self { kind, providers }
    }

    pub fn kind(&self) -> TransformationKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Provider names in priority order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Worst-case wall-clock budget for one walk down this chain.
    pub fn total_budget(&self) -> std::time::Duration {
        self.providers.iter().map(|p| p.timeout(self.kind)).sum()
    }

    /// Try providers in order until one succeeds.
    #[instrument(skip(self, request), fields(kind = %self.kind))]
    pub async fn execute(&self, request: &TransformationRequest) -> ChainRun {
        let start = Instant::now();
        let mut attempts = Vec::with_capacity(self.providers.len());
        let mut last_err = None;

        for provider in &self.providers {
            let budget = provider.timeout(self.kind);
            let started_at = Utc::now();
            let attempt_start = Instant::now();

            let outcome =
                match tokio::time::timeout(budget, provider.submit(request, budget)).await {
                    Ok(Ok(location)) => {
                        attempts.push(ProviderAttempt {
                            provider: provider.name().to_string(),
                            started_at,
                            elapsed_ms: attempt_start.elapsed().as_millis() as u64,
                            outcome: AttemptOutcome::Success,
                        });
                        Self::record_attempt(self.kind, provider.name(), attempt_start, "ok");
                        Self::record_request(self.kind, provider.name(), start, true);
                        debug!(provider = provider.name(), "transformation succeeded");
                        return ChainRun {
                            attempts,
                            result: Ok(ChainSuccess {
                                location,
                                provider: provider.name().to_string(),
                            }),
                        };
                    }
                    Ok(Err(e)) => e,
                    Err(_) => MorphoError::VendorTimeout {
                        timeout: Some(budget),
                    },
                };

            let status = match &outcome {
                MorphoError::VendorTimeout { .. } => "timeout",
                _ => "error",
            };
            Self::record_attempt(self.kind, provider.name(), attempt_start, status);
            attempts.push(ProviderAttempt {
                provider: provider.name().to_string(),
                started_at,
                elapsed_ms: attempt_start.elapsed().as_millis() as u64,
                outcome: AttemptOutcome::for_error(&outcome),
            });

            if Self::is_fallback_trigger(&outcome) {
                warn!(
                    provider = provider.name(),
                    error = %outcome,
                    "provider failed, falling through"
                );
                last_err = Some(outcome);
                continue;
            }

            Self::record_request(self.kind, provider.name(), start, false);
            return ChainRun {
                attempts,
                result: Err(outcome),
            };
        }

        Self::record_request(self.kind, "none", start, false);
        let result = Err(match last_err {
            Some(_) => MorphoError::AllProvidersExhausted {
                attempts: attempts.len(),
            },
            None => MorphoError::NoProvider,
        });
        ChainRun { attempts, result }
    }

    /// Whether an error should trigger fallback to the next provider.
    ///
    /// Bad input is terminal; no other vendor will accept what this
    /// one rejected as malformed. Everything else is a vendor-side
    /// problem worth trying the next entry for.
    fn is_fallback_trigger(e: &MorphoError) -> bool {
        !matches!(e, MorphoError::InvalidInput(_))
    }

    /// Record per-attempt metrics (counter + histogram).
    fn record_attempt(
        kind: TransformationKind,
        provider: &str,
        start: Instant,
        status: &'static str,
    ) {
        metrics::counter!(telemetry::ATTEMPTS_TOTAL,
            "kind" => kind.as_str(),
            "provider" => provider.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::ATTEMPT_DURATION_SECONDS,
            "kind" => kind.as_str(),
            "provider" => provider.to_owned(),
        )
        .record(start.elapsed().as_secs_f64());
    }

    /// Record whole-request metrics (counter + histogram).
    fn record_request(kind: TransformationKind, provider: &str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "kind" => kind.as_str(),
            "provider" => provider.to_owned(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "kind" => kind.as_str(),
        )
        .record(start.elapsed().as_secs_f64());
    }
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("kind", &self.kind)
            .field("providers", &self.provider_names())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::types::Requester;

    enum MockBehavior {
        Succeed(&'static str),
        FailTransient,
        FailRejected,
        FailInvalidInput,
        Hang,
    }

    struct MockProvider {
        name: &'static str,
        behavior: MockBehavior,
        budget: Duration,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn new(name: &'static str, behavior: MockBehavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                budget: Duration::from_secs(5),
                calls: AtomicUsize::new(0),
            })
        }

        fn with_budget(name: &'static str, behavior: MockBehavior, budget: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                budget,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransformProvider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn supports(&self, _kind: TransformationKind) -> bool {
            true
        }

        fn timeout(&self, _kind: TransformationKind) -> Duration {
            self.budget
        }

        async fn submit(
            &self,
            _request: &TransformationRequest,
            _budget: Duration,
        ) -> Result<ResultLocation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                MockBehavior::Succeed(url) => Ok(ResultLocation(url.to_string())),
                MockBehavior::FailTransient => {
                    Err(MorphoError::VendorUnavailable("down".into()))
                }
                MockBehavior::FailRejected => {
                    Err(MorphoError::VendorRejected("no face detected".into()))
                }
                MockBehavior::FailInvalidInput => {
                    Err(MorphoError::InvalidInput("unreadable image".into()))
                }
                MockBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!("hang provider should be cut off by the budget")
                }
            }
        }
    }

    fn request() -> TransformationRequest {
        TransformationRequest::new(
            TransformationKind::Cartoon,
            Requester::metered("u1"),
            "https://cdn.test/me.jpg",
            None,
            Default::default(),
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn first_success_stops_the_walk() {
        let a = MockProvider::new("a", MockBehavior::FailTransient);
        let b = MockProvider::new("b", MockBehavior::Succeed("https://out/b.jpg"));
        let c = MockProvider::new("c", MockBehavior::Succeed("https://out/c.jpg"));
        let chain = FallbackChain::new(
            TransformationKind::Cartoon,
            vec![a.clone(), b.clone(), c.clone()],
        );

        let run = chain.execute(&request()).await;
        let success = run.result.unwrap();
        assert_eq!(success.provider, "b");
        assert_eq!(success.location.0, "https://out/b.jpg");

        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
        assert_eq!(c.call_count(), 0, "later providers must not be consulted");
    }

    #[tokio::test]
    async fn rejection_falls_through_like_an_outage() {
        let a = MockProvider::new("a", MockBehavior::FailRejected);
        let b = MockProvider::new("b", MockBehavior::Succeed("https://out/b.jpg"));
        let chain = FallbackChain::new(TransformationKind::Cartoon, vec![a, b.clone()]);

        let run = chain.execute(&request()).await;
        assert_eq!(run.result.unwrap().provider, "b");
        assert_eq!(b.call_count(), 1);
    }

    #[tokio::test]
    async fn invalid_input_is_terminal() {
        let a = MockProvider::new("a", MockBehavior::FailInvalidInput);
        let b = MockProvider::new("b", MockBehavior::Succeed("https://out/b.jpg"));
        let chain = FallbackChain::new(TransformationKind::Cartoon, vec![a, b.clone()]);

        let run = chain.execute(&request()).await;
        assert!(matches!(run.result, Err(MorphoError::InvalidInput(_))));
        assert_eq!(b.call_count(), 0);
        assert_eq!(run.attempts.len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_reports_every_attempt() {
        let a = MockProvider::new("a", MockBehavior::FailTransient);
        let b = MockProvider::new("b", MockBehavior::FailRejected);
        let chain = FallbackChain::new(TransformationKind::Cartoon, vec![a, b]);

        let run = chain.execute(&request()).await;
        assert!(matches!(
            run.result,
            Err(MorphoError::AllProvidersExhausted { attempts: 2 })
        ));
        assert_eq!(run.attempts.len(), 2);
        assert_eq!(run.attempts[0].provider, "a");
        assert_eq!(run.attempts[1].provider, "b");
        assert!(run
            .attempts
            .iter()
            .all(|a| !matches!(a.outcome, AttemptOutcome::Success)));
    }

    #[tokio::test]
    async fn wedged_provider_is_cut_off_at_its_budget() {
        let slow = MockProvider::with_budget("slow", MockBehavior::Hang, Duration::from_millis(20));
        let b = MockProvider::new("b", MockBehavior::Succeed("https://out/b.jpg"));
        let chain = FallbackChain::new(TransformationKind::Cartoon, vec![slow, b.clone()]);

        let run = chain.execute(&request()).await;
        assert_eq!(run.result.unwrap().provider, "b");
        assert!(matches!(run.attempts[0].outcome, AttemptOutcome::Timeout));
        assert_eq!(b.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_chain_has_no_provider() {
        let chain = FallbackChain::new(TransformationKind::Cartoon, Vec::new());
        let run = chain.execute(&request()).await;
        assert!(matches!(run.result, Err(MorphoError::NoProvider)));
        assert!(run.attempts.is_empty());
    }

    #[test]
    fn total_budget_sums_per_provider_budgets() {
        let a = MockProvider::with_budget(
            "a",
            MockBehavior::FailTransient,
            Duration::from_secs(60),
        );
        let b = MockProvider::with_budget(
            "b",
            MockBehavior::FailTransient,
            Duration::from_secs(90),
        );
        let chain = FallbackChain::new(TransformationKind::Cartoon, vec![a, b]);
        assert_eq!(chain.total_budget(), Duration::from_secs(150));
    }
}
