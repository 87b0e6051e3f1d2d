//! Provider trait for vendor-specific implementations.
//!
//! Every vendor client implements [`TransformProvider`] so the chain can
//! treat synchronous vendors and submit-then-poll vendors identically.
//! This enables:
//! - Decorator patterns: `RetryingTransformProvider<T>`
//! - Fallback chains: try providers in priority order
//! - Static per-kind routing: providers self-report kind support
//!
//! # Fallback Semantics
//!
//! `submit` returns a typed error rather than panicking or leaking vendor
//! payload shapes:
//! - `VendorRejected`, `VendorTimeout`, `VendorUnavailable`, `RateLimited`
//!   and `UnexpectedResponseShape` make the chain move to the next
//!   provider
//! - `InvalidInput` is terminal for the whole chain (a different vendor
//!   will not accept what this one proved malformed)
//!
//! A provider that polls internally must bound its total poll time to the
//! supplied budget and report overrun as `VendorTimeout` itself.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;
use crate::types::{ResultLocation, TransformationKind, TransformationRequest};

/// Provider for media transformations.
#[async_trait]
pub trait TransformProvider: Send + Sync {
    /// Provider name for logging/debugging and chain configuration.
    fn name(&self) -> &str;

    /// Whether this provider can execute the given kind at all.
    ///
    /// Chains are filtered through this at startup; a runtime call for
    /// an unsupported kind returns `VendorRejected` without touching the
    /// network.
    fn supports(&self, kind: TransformationKind) -> bool;

    /// Per-attempt time budget for this provider and kind.
    fn timeout(&self, kind: TransformationKind) -> Duration;

    /// Execute one transformation against the vendor.
    ///
    /// `budget` caps the whole call including any internal polling; the
    /// chain additionally enforces it from the outside, so exceeding it
    /// only costs accuracy of the reported failure, never unbounded
    /// waiting.
    async fn submit(
        &self,
        request: &TransformationRequest,
        budget: Duration,
    ) -> Result<ResultLocation>;
}
