//! End-to-end gateway tests: a full transformation round trip over
//! mocked vendors, covering fallback, the quota lifecycle, and the
//! relay leg that delivers the finished media.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use morpho::providers::{NanoBananaClient, ReplicateClient};
use morpho::types::{
    AttemptOutcome, Requester, TransformationKind, TransformationRequest,
};
use morpho::{Morpho, QuotaConfig, RelayConfig};

fn cartoon_request(requester: &Requester) -> TransformationRequest {
    TransformationRequest::new(
        TransformationKind::Cartoon,
        requester.clone(),
        "https://cdn.test/portrait.jpg",
        None,
        Default::default(),
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn cartoon_falls_back_and_the_result_relays() {
    let server = MockServer::start().await;
    let toon_url = format!("{}/delivery/toon.jpg", server.uri());
    let toon_bytes: &[u8] = b"\xff\xd8\xff\xe0rendered cartoon";

    // First provider in the cartoon chain is down.
    Mock::given(method("POST"))
        .and(path("/v1/models/google/nano-banana/predictions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    // The dedicated cartoon model picks the request up.
    Mock::given(method("POST"))
        .and(path("/v1/models/catacolabs/cartoonify/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pred-e2e-1",
            "status": "succeeded",
            "output": toon_url,
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/delivery/toon.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(toon_bytes, "image/jpeg"))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = Morpho::builder()
        .provider(Arc::new(NanoBananaClient::with_base_url(
            "r8-test",
            server.uri(),
        )))
        .provider(Arc::new(ReplicateClient::with_base_url(
            "r8-test",
            server.uri(),
        )))
        .no_retry()
        .relay(RelayConfig::new().allowed_origins([server.uri()]))
        .build()
        .unwrap();

    let requester = Requester::metered("user-e2e");
    let outcome = gateway
        .transform(cartoon_request(&requester))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.status, 200);
    assert_eq!(outcome.url.as_deref(), Some(toon_url.as_str()));
    assert_eq!(outcome.provider.as_deref(), Some("replicate"));

    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.attempts[0].provider, "nano-banana");
    assert!(matches!(
        outcome.attempts[0].outcome,
        AttemptOutcome::Failure { .. }
    ));
    assert_eq!(outcome.attempts[1].provider, "replicate");
    assert_eq!(outcome.attempts[1].outcome, AttemptOutcome::Success);

    // The client never touches the vendor CDN directly; the result
    // comes back through the relay.
    let media = gateway.relay(&toon_url).await.unwrap();
    assert_eq!(media.content_type, "image/jpeg");

    let mut stream = media.stream;
    let mut relayed = Vec::new();
    while let Some(chunk) = stream.next().await {
        relayed.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(relayed, toon_bytes);
}

#[tokio::test]
async fn exhausted_quota_recovers_with_an_ad_credit() {
    let server = MockServer::start().await;

    // Only the allowed transformations reach the vendor.
    Mock::given(method("POST"))
        .and(path("/v1/models/google/nano-banana/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pred-e2e-2",
            "status": "succeeded",
            "output": "https://replicate.delivery/out/toon.jpg",
        })))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = Morpho::builder()
        .provider(Arc::new(NanoBananaClient::with_base_url(
            "r8-test",
            server.uri(),
        )))
        .no_retry()
        .quota(QuotaConfig::new().daily_limit(1))
        .build()
        .unwrap();

    let requester = Requester::metered("user-quota");
    assert_eq!(
        gateway.remaining_today(&requester, TransformationKind::Cartoon),
        Some(1)
    );

    let first = gateway
        .transform(cartoon_request(&requester))
        .await
        .unwrap();
    assert!(first.success);
    assert_eq!(
        gateway.remaining_today(&requester, TransformationKind::Cartoon),
        Some(0)
    );

    let denied = gateway
        .transform(cartoon_request(&requester))
        .await
        .unwrap();
    assert!(!denied.success);
    assert_eq!(denied.status, 429);
    assert_eq!(denied.error_kind.as_deref(), Some("QuotaExceeded"));
    assert!(denied.attempts.is_empty());

    let credit = gateway
        .grant_ad_credit(&requester, None, "ad-view-1")
        .unwrap();
    assert!(credit.granted);
    assert_eq!(credit.remaining, Some(1));

    // The same token replayed grants nothing more.
    let replay = gateway
        .grant_ad_credit(&requester, None, "ad-view-1")
        .unwrap();
    assert!(!replay.granted);
    assert_eq!(replay.remaining, Some(1));

    let third = gateway
        .transform(cartoon_request(&requester))
        .await
        .unwrap();
    assert!(third.success);
    assert_eq!(
        gateway.remaining_today(&requester, TransformationKind::Cartoon),
        Some(0)
    );
}

#[tokio::test]
async fn unlimited_tier_bypasses_the_daily_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/models/google/nano-banana/predictions"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "pred-e2e-3",
            "status": "succeeded",
            "output": "https://replicate.delivery/out/toon.jpg",
        })))
        .expect(3)
        .mount(&server)
        .await;

    let gateway = Morpho::builder()
        .provider(Arc::new(NanoBananaClient::with_base_url(
            "r8-test",
            server.uri(),
        )))
        .no_retry()
        .quota(QuotaConfig::new().daily_limit(0))
        .build()
        .unwrap();

    let requester = Requester::unlimited("subscriber-1");
    assert_eq!(
        gateway.remaining_today(&requester, TransformationKind::Cartoon),
        None
    );

    for _ in 0..3 {
        let outcome = gateway
            .transform(cartoon_request(&requester))
            .await
            .unwrap();
        assert!(outcome.success);
    }
}
