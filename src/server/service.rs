//! HTTP service implementation.
//!
//! Every JSON response is the canonical envelope: `success` is always
//! present, the HTTP status mirrors the outcome (200 success, 400
//! invalid input, 404 disabled kind, 429 quota, 503 exhausted), and
//! relayed media streams raw bytes with the upstream content type.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::gateway::Morpho;
use crate::server::config::ServerConfig;
use crate::types::{
    Requester, Tier, TransformParams, TransformationKind, TransformationOutcome,
    TransformationRequest,
};
use crate::{MorphoError, Result};

/// Transformation request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformBody {
    /// Requester id as resolved by the identity collaborator.
    pub user_id: String,
    /// Subscription tier stamped by the identity collaborator.
    /// Defaults to metered, the restrictive choice.
    #[serde(default = "default_tier")]
    pub tier: Tier,
    /// Primary input: https URL, data URI, or raw base64.
    pub source: String,
    /// Swap target for face-swap kinds.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub params: TransformParams,
    /// Client idempotency key.
    #[serde(default)]
    pub request_id: Option<String>,
}

fn default_tier() -> Tier {
    Tier::Metered
}

/// Ad-credit grant request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdCreditBody {
    pub user_id: String,
    #[serde(default = "default_tier")]
    pub tier: Tier,
    /// Kind to credit under per-kind quota scope; ignored under global.
    #[serde(default)]
    pub kind: Option<TransformationKind>,
    /// Completion token from the ad-network collaborator. Replays
    /// within the token TTL grant nothing.
    pub ad_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdCreditEnvelope {
    success: bool,
    granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: String,
}

/// Build the router for a gateway instance.
///
/// Routes:
/// - `POST /gateway/{kind}` — run a transformation
/// - `GET /gateway/proxy-image?url=` — stream an allow-listed result
/// - `POST /gateway/ad-credit` — credit one extra transformation
/// - `GET /health` — liveness and version
pub fn router(gateway: Arc<Morpho>) -> Router {
    Router::new()
        .route("/gateway/proxy-image", get(proxy_image))
        .route("/gateway/ad-credit", post(ad_credit))
        .route("/gateway/{kind}", post(transform))
        .route("/health", get(health))
        .with_state(gateway)
}

/// Serve the gateway until ctrl-c or SIGTERM.
pub async fn serve(gateway: Arc<Morpho>, config: &ServerConfig) -> Result<()> {
    let addr: SocketAddr = config.address.parse().map_err(|e| {
        MorphoError::Configuration(format!("Invalid address {:?}: {e}", config.address))
    })?;

    let app = router(gateway)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.limits.request_timeout_secs,
        )))
        .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| MorphoError::Configuration(format!("Failed to bind {addr}: {e}")))?;
    info!(%addr, "morphod listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| MorphoError::Http(e.to_string()))?;

    info!("server shutdown complete");
    Ok(())
}

/// Shutdown signal handler.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

fn envelope_response(outcome: TransformationOutcome) -> Response {
    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(outcome)).into_response()
}

fn error_response(error: &MorphoError) -> Response {
    envelope_response(TransformationOutcome::failed(error, Vec::new()))
}

async fn transform(
    State(gateway): State<Arc<Morpho>>,
    Path(kind): Path<String>,
    body: std::result::Result<Json<TransformBody>, JsonRejection>,
) -> Response {
    let kind: TransformationKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return error_response(&e),
    };
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(&MorphoError::InvalidInput(rejection.body_text()));
        }
    };

    let requester = Requester {
        id: body.user_id,
        tier: body.tier,
    };
    let request = match TransformationRequest::new(
        kind,
        requester,
        &body.source,
        body.target.as_deref(),
        body.params,
        body.request_id,
    ) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    match gateway.transform(request).await {
        Ok(outcome) => envelope_response(outcome),
        Err(e) => error_response(&e),
    }
}

async fn proxy_image(
    State(gateway): State<Arc<Morpho>>,
    query: std::result::Result<Query<ProxyQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return error_response(&MorphoError::InvalidInput(rejection.body_text()));
        }
    };

    match gateway.relay(&query.url).await {
        Ok(media) => {
            let mut headers = HeaderMap::new();
            let content_type = HeaderValue::from_str(&media.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
            headers.insert(CONTENT_TYPE, content_type);
            if let Some(len) = media.content_length {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
            }
            (StatusCode::OK, headers, Body::from_stream(media.stream)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn ad_credit(
    State(gateway): State<Arc<Morpho>>,
    body: std::result::Result<Json<AdCreditBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(&MorphoError::InvalidInput(rejection.body_text()));
        }
    };

    let requester = Requester {
        id: body.user_id,
        tier: body.tier,
    };
    match gateway.grant_ad_credit(&requester, body.kind, &body.ad_token) {
        Ok(outcome) => (
            StatusCode::OK,
            Json(AdCreditEnvelope {
                success: true,
                granted: outcome.granted,
                remaining: outcome.remaining,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::version::version_string(),
    }))
}
