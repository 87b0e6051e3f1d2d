//! Idempotent replay cache for completed transformations.
//!
//! Mobile clients resubmit: flaky radios, app restarts, impatient
//! polling. When a request carries a client `request_id`, its finished
//! outcome is cached under `(requester, request_id)` so a replay gets
//! the same envelope back without touching quota or vendors again.
//!
//! Concurrent duplicates coalesce: moka's `try_get_with` runs the
//! underlying transformation once and hands every waiter the same
//! result. Failed runs are never cached; a replay after a failure is a
//! genuine new attempt.

use std::time::Duration;

use moka::future::Cache;

use crate::telemetry;
use crate::types::TransformationOutcome;

/// Configuration for the replay cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// Time-to-live for cached entries. Default: 1 hour.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// In-memory replay cache keyed by `(requester, request_id)`.
pub struct ResultCache {
    cache: Cache<String, TransformationOutcome>,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.ttl)
            .build();
        Self { cache }
    }

    /// Return the cached outcome for this key, or run `run` to produce
    /// one. `run` resolves to `Ok` for outcomes worth replaying and
    /// `Err` for ones that are not; both sides carry the envelope, only
    /// the `Ok` side is stored.
    pub async fn get_or_run<F>(
        &self,
        requester: &str,
        request_id: &str,
        run: F,
    ) -> TransformationOutcome
    where
        F: Future<Output = std::result::Result<TransformationOutcome, TransformationOutcome>>,
    {
        let key = format!("{requester}\u{1f}{request_id}");

        // Racy peek, metrics only; the authoritative lookup is below.
        if self.cache.contains_key(&key) {
            metrics::counter!(telemetry::RESULT_CACHE_HITS_TOTAL).increment(1);
        } else {
            metrics::counter!(telemetry::RESULT_CACHE_MISSES_TOTAL).increment(1);
        }

        match self.cache.try_get_with(key, run).await {
            Ok(outcome) => outcome,
            Err(failed) => (*failed).clone(),
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
