//! Telemetry metric name constants.
//!
//! Centralised metric names for morpho operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `morpho_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `kind` — transformation kind (e.g. "cartoon", "face-swap-image")
//! - `provider` — provider name (e.g. "nano-banana", "piapi")
//! - `status` — outcome: "ok" or "error"
//! - `reason` — denial or failure kind where applicable

/// Total transformation requests accepted by the gateway.
///
/// Labels: `kind`, `provider` (winning provider, or "none"), `status`
/// ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "morpho_requests_total";

/// Full transformation request duration in seconds, quota check through
/// terminal outcome.
///
/// Labels: `kind`.
pub const REQUEST_DURATION_SECONDS: &str = "morpho_request_duration_seconds";

/// Total provider attempts made by fallback chains.
///
/// Labels: `kind`, `provider`, `status` ("ok" | "error").
pub const ATTEMPTS_TOTAL: &str = "morpho_attempts_total";

/// Single provider attempt duration in seconds.
///
/// Labels: `kind`, `provider`.
pub const ATTEMPT_DURATION_SECONDS: &str = "morpho_attempt_duration_seconds";

/// Total retry attempts against one provider (not counting the initial
/// request).
///
/// Labels: `provider`.
pub const RETRIES_TOTAL: &str = "morpho_retries_total";

/// Total quota denials.
///
/// Labels: `kind`, `scope` ("global" | "per-kind").
pub const QUOTA_DENIALS_TOTAL: &str = "morpho_quota_denials_total";

/// Total ad credits granted.
///
/// Labels: `scope` ("global" | "per-kind").
pub const AD_CREDITS_GRANTED_TOTAL: &str = "morpho_ad_credits_granted_total";

/// Total relay fetches, including denied ones.
///
/// Labels: `status` ("ok" | "denied" | "error").
pub const RELAY_REQUESTS_TOTAL: &str = "morpho_relay_requests_total";

/// Total bytes streamed through the relay.
pub const RELAY_BYTES_TOTAL: &str = "morpho_relay_bytes_total";

/// Total result-cache hits.
pub const RESULT_CACHE_HITS_TOTAL: &str = "morpho_result_cache_hits_total";

/// Total result-cache misses.
pub const RESULT_CACHE_MISSES_TOTAL: &str = "morpho_result_cache_misses_total";
