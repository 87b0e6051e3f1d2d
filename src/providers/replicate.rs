//! Replicate predictions API client and the legacy model provider.
//!
//! Two things live here: [`PredictionsClient`], the low-level
//! create-then-poll plumbing for Replicate's predictions API (also used
//! by the nano-banana provider), and [`ReplicateClient`], the provider
//! wrapping the stable, dedicated per-kind models kept as the late
//! fallback tier.
//!
//! See: <https://replicate.com/docs/reference/http>

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::traits::TransformProvider;
use crate::types::{ResultLocation, TransformationKind, TransformationRequest};
use crate::{MorphoError, Result};

/// Default base URL for the Replicate API
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.replicate.com";

/// Cadence for polling a prediction until it reaches a terminal status.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Per-HTTP-call timeout; the overall budget is enforced by the poll
/// deadline, this only bounds a single create/poll round trip.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Low-level client for Replicate's predictions API.
///
/// Creates a prediction and polls it to a terminal status within the
/// caller's budget. Vendors on this API return their output as a bare
/// URL string, a list of URL strings, or an object with a `url` field;
/// anything else is an unexpected shape.
#[derive(Clone)]
pub(crate) struct PredictionsClient {
    api_token: String,
    http: Client,
    base_url: String,
}

impl PredictionsClient {
    pub(crate) fn new(api_token: impl Into<String>) -> Self {
        Self::with_base_url(api_token, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub(crate) fn with_base_url(
        api_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_token: api_token.into(),
            http,
            base_url: base_url.into(),
        }
    }

    /// Run a model to completion and return its output URL.
    ///
    /// `version` pins an exact model version; without one the model's
    /// latest version is used via the model-scoped route.
    pub(crate) async fn run_model(
        &self,
        model: &str,
        version: Option<&str>,
        input: Value,
        budget: Duration,
    ) -> Result<ResultLocation> {
        let deadline = Instant::now() + budget;

        let url = match version {
            Some(_) => format!("{}/v1/predictions", self.base_url),
            None => format!("{}/v1/models/{}/predictions", self.base_url, model),
        };
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .json(&CreatePredictionRequest { version, input })
            .send()
            .await?;
        handle_response_errors(&response, model)?;

        let mut prediction: Prediction = response
            .json()
            .await
            .map_err(|e| MorphoError::UnexpectedResponseShape(e.to_string()))?;
        debug!(model, id = %prediction.id, status = %prediction.status, "prediction created");

        loop {
            match prediction.status.as_str() {
                "succeeded" => {
                    let output = prediction.output.ok_or_else(|| {
                        MorphoError::UnexpectedResponseShape(format!(
                            "{model} succeeded without output"
                        ))
                    })?;
                    return extract_output_url(&output);
                }
                "failed" => {
                    return Err(MorphoError::VendorRejected(format!(
                        "{model} failed: {}",
                        prediction.error_message()
                    )));
                }
                "canceled" => {
                    return Err(MorphoError::VendorUnavailable(format!(
                        "{model} prediction was canceled"
                    )));
                }
                // "starting" | "processing"
                _ => {
                    if Instant::now() + POLL_INTERVAL >= deadline {
                        return Err(MorphoError::VendorTimeout {
                            timeout: Some(budget),
                        });
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                    prediction = self.get_prediction(&prediction.id).await?;
                }
            }
        }
    }

    async fn get_prediction(&self, id: &str) -> Result<Prediction> {
        let url = format!("{}/v1/predictions/{}", self.base_url, id);
        let response = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .send()
            .await?;
        handle_response_errors(&response, id)?;
        response
            .json()
            .await
            .map_err(|e| MorphoError::UnexpectedResponseShape(e.to_string()))
    }
}

/// Check response status and map to the appropriate error.
fn handle_response_errors(response: &reqwest::Response, subject: &str) -> Result<()> {
    let status = response.status();

    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        401 | 403 => Err(MorphoError::VendorRejected(format!(
            "authentication rejected for {subject}"
        ))),
        404 => Err(MorphoError::VendorRejected(format!("{subject} not found"))),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(MorphoError::RateLimited { retry_after })
        }
        code if code >= 500 => Err(MorphoError::VendorUnavailable(format!(
            "Replicate returned status {code}"
        ))),
        code => Err(MorphoError::VendorRejected(format!(
            "Replicate returned status {code}"
        ))),
    }
}

/// Pull the result URL out of a prediction output value.
fn extract_output_url(output: &Value) -> Result<ResultLocation> {
    let url = match output {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items.first().and_then(Value::as_str),
        Value::Object(fields) => fields.get("url").and_then(Value::as_str),
        _ => None,
    };
    match url {
        Some(u) if !u.is_empty() => Ok(ResultLocation(u.to_string())),
        _ => Err(MorphoError::UnexpectedResponseShape(format!(
            "unusable prediction output: {output}"
        ))),
    }
}

#[derive(Serialize)]
struct CreatePredictionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    input: Value,
}

#[derive(Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        }
    }
}

// ============================================================================
// Legacy model provider
// ============================================================================

/// One dedicated model entry in the legacy catalogue.
struct ModelSpec {
    name: &'static str,
    /// Pinned version id; `None` runs the latest.
    version: Option<&'static str>,
    timeout: Duration,
}

/// Face-swap models, in priority order. The advanced model composes
/// better but is slower; the older one survives as the emergency tier.
const FACE_SWAP_MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "easel/advanced-face-swap",
        version: None,
        timeout: Duration::from_secs(90),
    },
    ModelSpec {
        name: "omniedgeio/face-swap",
        version: None,
        timeout: Duration::from_secs(60),
    },
];

const UPSCALE_MODELS: &[ModelSpec] = &[ModelSpec {
    name: "nightmareai/real-esrgan",
    version: None,
    timeout: Duration::from_secs(60),
}];

const RESTORE_MODELS: &[ModelSpec] = &[ModelSpec {
    name: "tencentarc/gfpgan",
    version: None,
    timeout: Duration::from_secs(60),
}];

const CARTOON_MODELS: &[ModelSpec] = &[ModelSpec {
    name: "catacolabs/cartoonify",
    version: None,
    timeout: Duration::from_secs(60),
}];

/// Provider wrapping Replicate's dedicated per-kind models.
///
/// Kinds with several models cascade through them in priority order
/// inside one `submit`; the per-kind `timeout()` is the sum of the
/// model budgets so the chain's view of this provider stays accurate.
#[derive(Clone)]
pub struct ReplicateClient {
    predictions: PredictionsClient,
}

impl ReplicateClient {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            predictions: PredictionsClient::new(api_token),
        }
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            predictions: PredictionsClient::with_base_url(api_token, base_url),
        }
    }

    fn models_for(kind: TransformationKind) -> &'static [ModelSpec] {
        match kind {
            TransformationKind::FaceSwapImage => FACE_SWAP_MODELS,
            TransformationKind::HdUpscale => UPSCALE_MODELS,
            TransformationKind::RestoreOldPhoto => RESTORE_MODELS,
            TransformationKind::Cartoon => CARTOON_MODELS,
            _ => &[],
        }
    }

    fn build_input(model: &str, request: &TransformationRequest) -> Value {
        let source = request.source.as_str();
        match model {
            "easel/advanced-face-swap" => {
                let target = request.target.as_ref().map(|t| t.as_str());
                json!({
                    "target_image": target,
                    "swap_image": source,
                    "hair_source": "target",
                })
            }
            "omniedgeio/face-swap" => {
                let target = request.target.as_ref().map(|t| t.as_str());
                json!({
                    "input_image": target,
                    "target_image": target,
                    "swap_image": source,
                })
            }
            "nightmareai/real-esrgan" => json!({
                "image": source,
                "scale": 4,
            }),
            "tencentarc/gfpgan" => json!({
                "img": source,
                "version": "v1.4",
                "scale": 2,
            }),
            _ => json!({ "image": source }),
        }
    }
}

#[async_trait]
impl TransformProvider for ReplicateClient {
    fn name(&self) -> &str {
        "replicate"
    }

    fn supports(&self, kind: TransformationKind) -> bool {
        !Self::models_for(kind).is_empty()
    }

    fn timeout(&self, kind: TransformationKind) -> Duration {
        Self::models_for(kind)
            .iter()
            .map(|spec| spec.timeout)
            .sum()
    }

    async fn submit(
        &self,
        request: &TransformationRequest,
        budget: Duration,
    ) -> Result<ResultLocation> {
        let models = Self::models_for(request.kind);
        if models.is_empty() {
            return Err(MorphoError::VendorRejected(format!(
                "replicate has no model for {}",
                request.kind
            )));
        }

        let deadline = Instant::now() + budget;
        let mut last_err = None;
        for spec in models {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let model_budget = spec.timeout.min(remaining);
            let input = Self::build_input(spec.name, request);
            match self
                .predictions
                .run_model(spec.name, spec.version, input, model_budget)
                .await
            {
                Ok(location) => return Ok(location),
                Err(e) => {
                    debug!(model = spec.name, error = %e, "legacy model failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or(MorphoError::VendorTimeout {
            timeout: Some(budget),
        }))
    }
}
