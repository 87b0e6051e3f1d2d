//! Morpho error types

use std::time::Duration;

/// Morpho error types
#[derive(Debug, thiserror::Error)]
pub enum MorphoError {
    // Client-side input errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transformation kind is not enabled: {0}")]
    KindDisabled(String),

    // Per-provider errors; these drive the fallback decision and are not
    // surfaced individually unless the whole chain exhausts.
    #[error("vendor rejected the request: {0}")]
    VendorRejected(String),

    #[error("vendor call timed out (budget {timeout:?})")]
    VendorTimeout { timeout: Option<Duration> },

    #[error("vendor unavailable: {0}")]
    VendorUnavailable(String),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("unexpected vendor response shape: {0}")]
    UnexpectedResponseShape(String),

    // Terminal gateway outcomes
    #[error("all providers exhausted after {attempts} attempts")]
    AllProvidersExhausted { attempts: usize },

    #[error("daily quota exceeded (limit {limit})")]
    QuotaExceeded { limit: u32 },

    // Relay errors
    #[error("origin not allowed: {0}")]
    OriginNotAllowed(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream fetch timed out after {timeout:?}")]
    UpstreamTimeout { timeout: Duration },

    #[error("upstream returned status {status}")]
    UpstreamNon2xx { status: u16 },

    #[error("payload exceeds relay size cap ({limit} bytes)")]
    PayloadTooLarge { limit: u64 },

    // Configuration errors
    #[error("no provider configured")]
    NoProvider,

    #[error("configuration error: {0}")]
    Configuration(String),

    // Transport errors not yet classified at a vendor boundary
    #[error("HTTP error: {0}")]
    Http(String),
}

impl MorphoError {
    /// Whether a retry of the same call may succeed.
    ///
    /// Only vendor-side availability faults qualify; timeouts already
    /// consumed their budget and rejections will not change on replay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MorphoError::VendorUnavailable(_)
                | MorphoError::RateLimited { .. }
                | MorphoError::Http(_)
        )
    }

    /// Vendor-provided wait hint, when one was given.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MorphoError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Canonical wire name for the response envelope's `errorKind` field.
    pub fn error_kind(&self) -> &'static str {
        match self {
            MorphoError::InvalidInput(_) => "InvalidInput",
            MorphoError::KindDisabled(_) => "KindDisabled",
            MorphoError::VendorRejected(_) => "VendorRejected",
            MorphoError::VendorTimeout { .. } => "VendorTimeout",
            MorphoError::VendorUnavailable(_) | MorphoError::RateLimited { .. } => {
                "VendorUnavailable"
            }
            MorphoError::UnexpectedResponseShape(_) => "UnexpectedResponseShape",
            MorphoError::AllProvidersExhausted { .. } => "AllProvidersExhausted",
            MorphoError::QuotaExceeded { .. } => "QuotaExceeded",
            MorphoError::OriginNotAllowed(_) => "OriginNotAllowed",
            MorphoError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            MorphoError::UpstreamTimeout { .. } => "UpstreamTimeout",
            MorphoError::UpstreamNon2xx { .. } => "UpstreamNon2xx",
            MorphoError::PayloadTooLarge { .. } => "PayloadTooLarge",
            MorphoError::NoProvider | MorphoError::Configuration(_) => "Configuration",
            MorphoError::Http(_) => "VendorUnavailable",
        }
    }

    /// HTTP status the error maps to at the gateway surface.
    pub fn status_code(&self) -> u16 {
        match self {
            MorphoError::InvalidInput(_) => 400,
            MorphoError::KindDisabled(_) => 404,
            MorphoError::QuotaExceeded { .. } => 429,
            MorphoError::AllProvidersExhausted { .. } => 503,
            MorphoError::OriginNotAllowed(_) => 403,
            MorphoError::UpstreamTimeout { .. } => 504,
            MorphoError::UpstreamUnavailable(_)
            | MorphoError::UpstreamNon2xx { .. }
            | MorphoError::PayloadTooLarge { .. } => 502,
            // Per-provider kinds only surface through AllProvidersExhausted;
            // a direct mapping exists for completeness.
            MorphoError::VendorRejected(_)
            | MorphoError::VendorTimeout { .. }
            | MorphoError::VendorUnavailable(_)
            | MorphoError::RateLimited { .. }
            | MorphoError::UnexpectedResponseShape(_)
            | MorphoError::Http(_) => 502,
            MorphoError::NoProvider | MorphoError::Configuration(_) => 500,
        }
    }
}

impl From<reqwest::Error> for MorphoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MorphoError::VendorTimeout { timeout: None }
        } else if err.is_connect() {
            MorphoError::VendorUnavailable(err.to_string())
        } else {
            MorphoError::Http(err.to_string())
        }
    }
}

/// Result type alias for Morpho operations
pub type Result<T> = std::result::Result<T, MorphoError>;
