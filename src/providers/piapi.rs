//! PiAPI provider: asynchronous task API over the Qubico toolkits.
//!
//! The only provider in the set that handles video. Work is submitted
//! as a task (`POST /task`), then polled (`GET /task/{id}`) on a fixed
//! cadence until it completes, fails, or the budget runs out.
//!
//! See: <https://piapi.ai/docs>

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::traits::TransformProvider;
use crate::types::{ResultLocation, TransformationKind, TransformationRequest};
use crate::{MorphoError, Result};

/// Default base URL for the PiAPI task API
pub(crate) const DEFAULT_BASE_URL: &str = "https://api.piapi.ai/api/v1";

/// Cadence for polling a task until it reaches a terminal status.
const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Per-HTTP-call timeout; the overall budget is enforced by the poll
/// deadline.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const IMAGE_TIMEOUT: Duration = Duration::from_secs(60);
const VIDEO_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider for PiAPI's Qubico image and video toolkits.
#[derive(Clone)]
pub struct PiApiClient {
    api_key: String,
    http: Client,
    base_url: String,
}

impl PiApiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into(),
        }
    }

    /// Build the task payload for a request. Face swap rides the
    /// toolkit matching the target's media class; upscaling is
    /// image-toolkit only.
    fn task_payload(request: &TransformationRequest) -> Result<Value> {
        let source = request.source.as_str();
        match request.kind {
            TransformationKind::FaceSwapImage => {
                let target = required_target(request)?;
                Ok(json!({
                    "model": "Qubico/image-toolkit",
                    "task_type": "face-swap",
                    "input": {
                        "target_image": target,
                        "swap_image": source,
                    },
                }))
            }
            TransformationKind::FaceSwapVideo => {
                let target = required_target(request)?;
                Ok(json!({
                    "model": "Qubico/video-toolkit",
                    "task_type": "face-swap",
                    "input": {
                        "target_video": target,
                        "swap_image": source,
                    },
                }))
            }
            TransformationKind::HdUpscale => Ok(json!({
                "model": "Qubico/image-toolkit",
                "task_type": "upscale",
                "input": {
                    "image": source,
                },
            })),
            other => Err(MorphoError::VendorRejected(format!(
                "piapi does not handle {other}"
            ))),
        }
    }

    async fn create_task(&self, payload: &Value) -> Result<String> {
        let url = format!("{}/task", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(payload)
            .send()
            .await?;
        handle_response_errors(&response)?;

        let envelope: ApiEnvelope<TaskCreated> = response
            .json()
            .await
            .map_err(|e| MorphoError::UnexpectedResponseShape(e.to_string()))?;
        if envelope.code != 200 {
            return Err(MorphoError::VendorRejected(format!(
                "PiAPI refused the task: {}",
                envelope.message.as_deref().unwrap_or("no message")
            )));
        }
        envelope
            .data
            .map(|d| d.task_id)
            .ok_or_else(|| {
                MorphoError::UnexpectedResponseShape("task created without a task_id".into())
            })
    }

    async fn poll_task(&self, task_id: &str) -> Result<TaskState> {
        let url = format!("{}/task/{}", self.base_url, task_id);
        let response = self
            .http
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        handle_response_errors(&response)?;

        let envelope: ApiEnvelope<TaskState> = response
            .json()
            .await
            .map_err(|e| MorphoError::UnexpectedResponseShape(e.to_string()))?;
        envelope.data.ok_or_else(|| {
            MorphoError::UnexpectedResponseShape(format!("task {task_id} poll had no data"))
        })
    }
}

fn required_target(request: &TransformationRequest) -> Result<&str> {
    request
        .target
        .as_ref()
        .map(|t| t.as_str())
        .ok_or_else(|| {
            MorphoError::InvalidInput(format!("{} requires a target input", request.kind))
        })
}

/// Check response status and map to the appropriate error.
fn handle_response_errors(response: &reqwest::Response) -> Result<()> {
    let status = response.status();

    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        401 | 403 => Err(MorphoError::VendorRejected(
            "PiAPI rejected the API key".into(),
        )),
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
            "PiAPI returned status {code}"
        ))),
        code => Err(MorphoError::VendorRejected(format!(
            "PiAPI returned status {code}"
        ))),
    }
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Default, Deserialize)]
struct TaskCreated {
    task_id: String,
}

#[derive(Default, Deserialize)]
struct TaskState {
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Option<TaskOutput>,
    #[serde(default)]
    error: Option<TaskError>,
}

#[derive(Deserialize)]
struct TaskOutput {
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
}

#[derive(Deserialize)]
struct TaskError {
    #[serde(default)]
    message: Option<String>,
}

impl TaskState {
    fn output_url(self) -> Option<String> {
        self.output.and_then(|o| o.image_url.or(o.video_url))
    }

    fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

#[async_trait]
impl TransformProvider for PiApiClient {
    fn name(&self) -> &str {
        "piapi"
    }

    fn supports(&self, kind: TransformationKind) -> bool {
        matches!(
            kind,
            TransformationKind::FaceSwapImage
                | TransformationKind::FaceSwapVideo
                | TransformationKind::HdUpscale
        )
    }

    fn timeout(&self, kind: TransformationKind) -> Duration {
        match kind {
            TransformationKind::FaceSwapVideo => VIDEO_TIMEOUT,
            _ => IMAGE_TIMEOUT,
        }
    }

    async fn submit(
        &self,
        request: &TransformationRequest,
        budget: Duration,
    ) -> Result<ResultLocation> {
        let payload = Self::task_payload(request)?;
        let deadline = Instant::now() + budget;

        let task_id = self.create_task(&payload).await?;
        debug!(kind = %request.kind, task_id, "piapi task created");

        loop {
            if Instant::now() + POLL_INTERVAL >= deadline {
                return Err(MorphoError::VendorTimeout {
                    timeout: Some(budget),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;

            let state = self.poll_task(&task_id).await?;
            match state.status.as_str() {
                "completed" => {
                    return state
                        .output_url()
                        .map(ResultLocation)
                        .ok_or_else(|| {
                            MorphoError::UnexpectedResponseShape(format!(
                                "task {task_id} completed without an output URL"
                            ))
                        });
                }
                "failed" => {
                    return Err(MorphoError::VendorRejected(format!(
                        "PiAPI task failed: {}",
                        state.error_message()
                    )));
                }
                // "pending" | "processing" | "staged"
                other => {
                    debug!(task_id, status = other, "piapi task still running");
                }
            }
        }
    }
}
