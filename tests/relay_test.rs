//! Integration tests for the download relay against a mocked vendor
//! origin.
//!
//! The allow-list logic has unit coverage next to the relay; these
//! tests exercise the full fetch path: streaming passthrough, denial
//! before any outbound traffic, and upstream failure mapping.

use futures_util::StreamExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use morpho::relay::{DownloadRelay, RelayConfig};
use morpho::MorphoError;

fn relay_for(server: &MockServer) -> DownloadRelay {
    DownloadRelay::new(RelayConfig::new().allowed_origins([server.uri()]))
}

async fn collect(media: morpho::relay::RelayedMedia) -> Vec<u8> {
    let mut stream = media.stream;
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk.unwrap());
    }
    bytes
}

#[tokio::test]
async fn allow_listed_media_streams_through_unchanged() {
    let server = MockServer::start().await;
    let body: &[u8] = b"\xff\xd8\xff\xe0fake jpeg payload";

    Mock::given(method("GET"))
        .and(path("/out/result.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "image/jpeg"))
        .expect(1)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let media = relay
        .fetch(&format!("{}/out/result.jpg", server.uri()))
        .await
        .unwrap();

    assert_eq!(media.content_type, "image/jpeg");
    assert_eq!(media.content_length, Some(body.len() as u64));
    assert_eq!(collect(media).await, body);
}

#[tokio::test]
async fn unlisted_origins_are_denied_without_outbound_traffic() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    // Default allow-list only, so the local mock origin is not on it.
    let relay = DownloadRelay::new(RelayConfig::new());

    for url in [
        format!("{}/internal/secret.jpg", server.uri()),
        "http://169.254.169.254/latest/meta-data".to_string(),
        "file:///etc/passwd".to_string(),
    ] {
        let err = relay.fetch(&url).await.unwrap_err();
        assert!(
            matches!(err, MorphoError::OriginNotAllowed(_)),
            "{url} should be denied, got {err:?}"
        );
    }
}

#[tokio::test]
async fn prefix_match_does_not_leak_to_sibling_hosts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let relay = DownloadRelay::new(RelayConfig::new());

    // Crafted hosts that merely start with an allow-listed origin's text.
    let err = relay
        .fetch("https://replicate.delivery.evil.example/out.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, MorphoError::OriginNotAllowed(_)));
}

#[tokio::test]
async fn declared_oversize_is_rejected_before_streaming() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/out/huge.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
        .expect(1)
        .mount(&server)
        .await;

    let relay = DownloadRelay::new(
        RelayConfig::new()
            .allowed_origins([server.uri()])
            .max_bytes(16),
    );
    let err = relay
        .fetch(&format!("{}/out/huge.jpg", server.uri()))
        .await
        .unwrap_err();

    match err {
        MorphoError::PayloadTooLarge { limit } => assert_eq!(limit, 16),
        other => panic!("expected PayloadTooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn upstream_error_status_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/out/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let err = relay
        .fetch(&format!("{}/out/gone.jpg", server.uri()))
        .await
        .unwrap_err();

    match err {
        MorphoError::UpstreamNon2xx { status } => assert_eq!(status, 404),
        other => panic!("expected UpstreamNon2xx, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_content_type_falls_back_to_octet_stream() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/out/mystery"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let media = relay
        .fetch(&format!("{}/out/mystery", server.uri()))
        .await
        .unwrap();

    assert_eq!(media.content_type, "application/octet-stream");
}
