//! Nano-banana provider: prompt-driven image editing on Replicate.
//!
//! One general-purpose image model covers every image transformation by
//! varying the prompt, which is why it sits first in most default
//! chains. Video kinds and plain upscaling are out of its reach and are
//! rejected without touching the network.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::replicate::PredictionsClient;
use super::traits::TransformProvider;
use crate::types::{ResultLocation, TransformationKind, TransformationRequest};
use crate::{MorphoError, Result};

const MODEL: &str = "google/nano-banana";

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// The face swap prompt is sensitive to the order of `image_input`:
/// the target scene goes first, the face to transplant second.
const FACE_SWAP_PROMPT: &str = "Swap the face from the second image onto the person in the \
     first image. Maintain the original pose, lighting, background, and body of the first \
     image. Keep facial features, skin tone, and expression from the second image's face. \
     Make the result look natural and seamless.";

/// Provider for the `google/nano-banana` image editing model.
#[derive(Clone)]
pub struct NanoBananaClient {
    predictions: PredictionsClient,
}

impl NanoBananaClient {
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

    fn prompt_for(request: &TransformationRequest) -> String {
        let params = &request.params;
        let mut prompt = match request.kind {
            TransformationKind::FaceSwapImage => FACE_SWAP_PROMPT.to_string(),
            TransformationKind::Cartoon => {
                "Turn this photo into a vibrant 3D cartoon version of the person. Keep the \
                 identity, expression, and framing recognizable while exaggerating features \
                 in a friendly animated style."
                    .to_string()
            }
            TransformationKind::Memoji => {
                "Turn the person in this photo into a glossy 3D memoji-style avatar on a \
                 plain background. Keep the hairstyle, skin tone, and expression \
                 recognizable."
                    .to_string()
            }
            TransformationKind::AnimalToon => {
                let animal = params.style.as_deref().unwrap_or("animal");
                format!(
                    "Reimagine the person in this photo as a cute cartoon {animal} \
                     character. Keep the expression, pose, and personality recognizable."
                )
            }
            TransformationKind::MuscleEnhance => {
                let degree = match params.intensity {
                    Some(i) if i >= 0.75 => "dramatically",
                    Some(i) if i < 0.4 => "subtly",
                    _ => "noticeably",
                };
                format!(
                    "Enhance the physique of the person in this photo so they look \
                     {degree} more muscular. Keep the face, pose, clothing, and \
                     background unchanged."
                )
            }
            TransformationKind::ArtStyle => {
                let style = params.style.as_deref().unwrap_or("a classic oil painting");
                format!(
                    "Repaint this photo in the style of {style}. Preserve the composition \
                     and the person's likeness."
                )
            }
            TransformationKind::RestoreOldPhoto => {
                "Restore this old photograph. Repair scratches, tears, and fading, sharpen \
                 soft details, and correct the colors naturally. Do not alter the people or \
                 the composition."
                    .to_string()
            }
            // Unsupported kinds are rejected in submit() before this runs.
            other => format!("Apply the {other} transformation to this photo."),
        };
        if params.template.is_some() {
            prompt.push_str(
                " Match the overall look and styling of the final reference image.",
            );
        }
        prompt
    }

    fn image_inputs(request: &TransformationRequest) -> Vec<String> {
        let mut images = Vec::with_capacity(3);
        if request.kind == TransformationKind::FaceSwapImage {
            // Target scene first, face to transplant second.
            if let Some(target) = &request.target {
                images.push(target.as_str().to_string());
            }
            images.push(request.source.as_str().to_string());
        } else {
            images.push(request.source.as_str().to_string());
        }
        if let Some(template) = &request.params.template {
            images.push(template.clone());
        }
        images
    }
}

#[async_trait]
impl TransformProvider for NanoBananaClient {
    fn name(&self) -> &str {
        "nano-banana"
    }

    fn supports(&self, kind: TransformationKind) -> bool {
        matches!(
            kind,
            TransformationKind::FaceSwapImage
                | TransformationKind::Cartoon
                | TransformationKind::Memoji
                | TransformationKind::AnimalToon
                | TransformationKind::MuscleEnhance
                | TransformationKind::ArtStyle
                | TransformationKind::RestoreOldPhoto
        )
    }

    fn timeout(&self, _kind: TransformationKind) -> Duration {
        SUBMIT_TIMEOUT
    }

    async fn submit(
        &self,
        request: &TransformationRequest,
        budget: Duration,
    ) -> Result<ResultLocation> {
        if !self.supports(request.kind) {
            return Err(MorphoError::VendorRejected(format!(
                "nano-banana does not handle {}",
                request.kind
            )));
        }

        let input = json!({
            "prompt": Self::prompt_for(request),
            "image_input": Self::image_inputs(request),
            "aspect_ratio": "match_input_image",
            "output_format": "jpg",
        });
        self.predictions.run_model(MODEL, None, input, budget).await
    }
}
