//! Terminal outcome and per-provider attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MorphoError;

/// Vendor CDN location of a produced result. Always fetched by the
/// client through the relay afterwards, never inlined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLocation(pub String);

impl std::fmt::Display for ResultLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How one provider attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptOutcome {
    Success,
    Failure { kind: String },
    Timeout,
}

impl AttemptOutcome {
    /// Classify a failed attempt. Timeouts get their own bucket; every
    /// other error is recorded under its wire kind.
    pub fn for_error(error: &MorphoError) -> Self {
        match error {
            MorphoError::VendorTimeout { .. } | MorphoError::UpstreamTimeout { .. } => {
                AttemptOutcome::Timeout
            }
            other => AttemptOutcome::Failure {
                kind: other.error_kind().to_string(),
            },
        }
    }
}

/// One entry of a chain's attempt log. Kept for the request's lifetime
/// only, for logging and for the envelope's diagnostics field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
}

/// The canonical terminal value of one gateway request, immutable once
/// produced. Exactly this serializes into the response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Winning provider on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<ProviderAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// HTTP status the envelope travels with. Not part of the wire body.
    #[serde(skip)]
    pub status: u16,
}

impl TransformationOutcome {
    pub fn succeeded(
        location: ResultLocation,
        provider: impl Into<String>,
        attempts: Vec<ProviderAttempt>,
    ) -> Self {
        TransformationOutcome {
            success: true,
            url: Some(location.0),
            provider: Some(provider.into()),
            error_kind: None,
            message: None,
            attempts,
            request_id: None,
            status: 200,
        }
    }

    pub fn failed(error: &MorphoError, attempts: Vec<ProviderAttempt>) -> Self {
        TransformationOutcome {
            success: false,
            url: None,
            provider: None,
            error_kind: Some(error.error_kind().to_string()),
            message: Some(error.to_string()),
            attempts,
            request_id: None,
            status: error.status_code(),
        }
    }

    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}
