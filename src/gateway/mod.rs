//! The gateway: chains, quota, replay cache and relay behind one type.

mod builder;

pub use builder::MorphoBuilder;

use std::collections::HashMap;

use tracing::instrument;

use crate::cache::ResultCache;
use crate::providers::FallbackChain;
use crate::quota::{AdCreditOutcome, QuotaGate};
use crate::relay::{DownloadRelay, RelayedMedia};
use crate::types::{Requester, TransformationKind, TransformationOutcome, TransformationRequest};
use crate::{MorphoError, Result};

/// One transformation gateway instance.
///
/// Owns a [`FallbackChain`] per enabled kind plus the quota gate, the
/// replay cache and the download relay. Construct with
/// [`Morpho::builder`]; everything is in-process and any number of
/// requests may run against `&self` concurrently.
pub struct Morpho {
    chains: HashMap<TransformationKind, FallbackChain>,
    quota: QuotaGate,
    relay: DownloadRelay,
    result_cache: ResultCache,
}

impl Morpho {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> MorphoBuilder {
        MorphoBuilder::new()
    }

    pub(crate) fn new(
        chains: HashMap<TransformationKind, FallbackChain>,
        quota: QuotaGate,
        relay: DownloadRelay,
        result_cache: ResultCache,
    ) -> Self {
        Self {
            chains,
            quota,
            relay,
            result_cache,
        }
    }

    /// Run one transformation to its terminal envelope.
    ///
    /// The quota is checked (and one unit consumed) before any vendor
    /// is called; the envelope then reports how the chain walk ended,
    /// including quota denials. `Err` is reserved for requests that
    /// never reach the pipeline, i.e. a kind with no chain.
    ///
    /// When the request carries a `request_id`, the finished success
    /// envelope is served from the replay cache on resubmission, and
    /// concurrent duplicates coalesce into a single run, so neither
    /// path consumes quota twice.
    #[instrument(skip(self, request), fields(kind = %request.kind, requester = %request.requester.id))]
    pub async fn transform(
        &self,
        request: TransformationRequest,
    ) -> Result<TransformationOutcome> {
        let chain = self
            .chains
            .get(&request.kind)
            .ok_or_else(|| MorphoError::KindDisabled(request.kind.to_string()))?;

        let request_id = request.request_id.clone();
        let run = async {
            if let Err(e) = self.quota.try_consume(&request.requester, request.kind) {
                return Err(TransformationOutcome::failed(&e, Vec::new()));
            }
            let run = chain.execute(&request).await;
            match run.result {
                Ok(success) => Ok(TransformationOutcome::succeeded(
                    success.location,
                    success.provider,
                    run.attempts,
                )),
                Err(e) => Err(TransformationOutcome::failed(&e, run.attempts)),
            }
        };

        let outcome = match &request_id {
            Some(rid) => {
                self.result_cache
                    .get_or_run(&request.requester.id, rid, run)
                    .await
            }
            None => run.await.unwrap_or_else(|failed| failed),
        };
        Ok(outcome.with_request_id(request_id))
    }

    /// Credit one extra transformation for a watched ad.
    pub fn grant_ad_credit(
        &self,
        requester: &Requester,
        kind: Option<TransformationKind>,
        ad_token: &str,
    ) -> Result<AdCreditOutcome> {
        self.quota.grant_ad_credit(requester, kind, ad_token)
    }

    /// Stream an allow-listed vendor result through the relay.
    pub async fn relay(&self, url: &str) -> Result<RelayedMedia> {
        self.relay.fetch(url).await
    }

    /// Transformations the requester has left today (`None` when the
    /// tier is unmetered).
    pub fn remaining_today(
        &self,
        requester: &Requester,
        kind: TransformationKind,
    ) -> Option<u32> {
        self.quota.remaining_today(requester, kind)
    }

    /// Kinds that currently have a chain, in canonical order.
    pub fn enabled_kinds(&self) -> Vec<TransformationKind> {
        TransformationKind::ALL
            .into_iter()
            .filter(|kind| self.chains.contains_key(kind))
            .collect()
    }

    /// The chain serving a kind, if one is enabled.
    pub fn chain_for(&self, kind: TransformationKind) -> Option<&FallbackChain> {
        self.chains.get(&kind)
    }
}

impl std::fmt::Debug for Morpho {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Morpho")
            .field("kinds", &self.enabled_kinds())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::providers::{ChainPlan, TransformProvider};
    use crate::quota::QuotaConfig;
    use crate::types::{ResultLocation, TransformParams};

    struct ScriptedProvider {
        name: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransformProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(MorphoError::VendorUnavailable("down".into()))
            } else {
                Ok(ResultLocation("https://cdn.vendor.test/out.jpg".into()))
            }
        }
    }

    fn gateway_with(provider: Arc<ScriptedProvider>, quota: QuotaConfig) -> Morpho {
        Morpho::builder()
            .provider(provider)
            .no_retry()
            .quota(quota)
            .chains(ChainPlan::new().order(TransformationKind::Cartoon, ["scripted"]))
            .build()
            .unwrap()
    }

    fn cartoon_request(request_id: Option<&str>) -> TransformationRequest {
        TransformationRequest::new(
            TransformationKind::Cartoon,
            Requester::metered("u1"),
            "https://cdn.test/me.jpg",
            None,
            TransformParams::default(),
            request_id.map(str::to_string),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn transform_produces_a_success_envelope() {
        let provider = ScriptedProvider::ok("scripted");
        let gateway = gateway_with(provider.clone(), QuotaConfig::default());

        let outcome = gateway
            .transform(cartoon_request(Some("req-1")))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.provider.as_deref(), Some("scripted"));
        assert_eq!(
            outcome.url.as_deref(),
            Some("https://cdn.vendor.test/out.jpg")
        );
        assert_eq!(outcome.request_id.as_deref(), Some("req-1"));
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.status, 200);
    }

    #[tokio::test]
    async fn kind_without_a_chain_is_rejected_up_front() {
        let gateway = gateway_with(ScriptedProvider::ok("scripted"), QuotaConfig::default());

        let request = TransformationRequest::new(
            TransformationKind::Memoji,
            Requester::metered("u1"),
            "https://cdn.test/me.jpg",
            None,
            TransformParams::default(),
            None,
        )
        .unwrap();
        let err = gateway.transform(request).await.unwrap_err();
        assert!(matches!(err, MorphoError::KindDisabled(_)));
    }

    #[tokio::test]
    async fn quota_denial_becomes_a_429_envelope() {
        let provider = ScriptedProvider::ok("scripted");
        let gateway = gateway_with(provider.clone(), QuotaConfig::new().daily_limit(0));

        let outcome = gateway.transform(cartoon_request(None)).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_kind.as_deref(), Some("QuotaExceeded"));
        assert_eq!(outcome.status, 429);
        assert_eq!(
            provider.call_count(),
            0,
            "denied requests must not reach vendors"
        );
    }

    #[tokio::test]
    async fn replayed_request_id_consumes_quota_once() {
        let provider = ScriptedProvider::ok("scripted");
        let gateway = gateway_with(provider.clone(), QuotaConfig::new().daily_limit(1));

        let first = gateway
            .transform(cartoon_request(Some("req-1")))
            .await
            .unwrap();
        let replay = gateway
            .transform(cartoon_request(Some("req-1")))
            .await
            .unwrap();
        assert!(first.success && replay.success);
        assert_eq!(provider.call_count(), 1);

        // The single quota unit went to the first run; a new id is denied.
        let fresh = gateway
            .transform(cartoon_request(Some("req-2")))
            .await
            .unwrap();
        assert_eq!(fresh.error_kind.as_deref(), Some("QuotaExceeded"));
    }

    #[tokio::test]
    async fn failed_runs_are_not_replayed_from_cache() {
        let provider = ScriptedProvider::failing("scripted");
        let gateway = gateway_with(provider.clone(), QuotaConfig::default());

        let first = gateway
            .transform(cartoon_request(Some("req-1")))
            .await
            .unwrap();
        let second = gateway
            .transform(cartoon_request(Some("req-1")))
            .await
            .unwrap();
        assert!(!first.success && !second.success);
        assert_eq!(first.error_kind.as_deref(), Some("AllProvidersExhausted"));
        assert_eq!(
            provider.call_count(),
            2,
            "a failure must not be served from cache"
        );
    }

    #[tokio::test]
    async fn concurrent_duplicates_share_one_run() {
        let provider = ScriptedProvider::ok("scripted");
        let gateway = Arc::new(gateway_with(
            provider.clone(),
            QuotaConfig::new().daily_limit(1),
        ));

        let (a, b) = tokio::join!(
            gateway.transform(cartoon_request(Some("req-1"))),
            gateway.transform(cartoon_request(Some("req-1"))),
        );
        assert!(a.unwrap().success);
        assert!(b.unwrap().success);
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn builder_without_providers_fails() {
        let err = Morpho::builder().build().unwrap_err();
        assert!(matches!(err, MorphoError::NoProvider));
    }

    #[test]
    fn enabled_kinds_follow_the_chain_plan() {
        let gateway = gateway_with(ScriptedProvider::ok("scripted"), QuotaConfig::default());
        // Only cartoon is wired explicitly; the default orders resolve to
        // nothing because no registered name matches them.
        assert_eq!(gateway.enabled_kinds(), vec![TransformationKind::Cartoon]);
    }
}
