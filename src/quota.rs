//! Daily usage quota with ad-credit top-ups.
//!
//! Metered requesters get a fixed number of transformations per UTC
//! day; watching a rewarded ad buys one more. Counters live in an
//! in-process [`DashMap`] keyed by requester (and kind, under per-kind
//! scope) and roll over lazily: the stored day is compared against the
//! current day on access, so no background sweeper is needed.
//!
//! Check-and-consume runs under the map's shard lock via the entry
//! API, which is what keeps a burst of concurrent requests from
//! slipping past the limit.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::telemetry;
use crate::types::{Requester, Tier, TransformationKind};
use crate::{MorphoError, Result};

/// What one quota ledger entry covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuotaScope {
    /// One shared daily allowance across every kind.
    #[default]
    Global,
    /// An independent daily allowance per kind.
    PerKind,
}

impl QuotaScope {
    fn as_str(&self) -> &'static str {
        match self {
            QuotaScope::Global => "global",
            QuotaScope::PerKind => "per-kind",
        }
    }
}

/// Quota configuration.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Free transformations per requester per UTC day.
    pub daily_limit: u32,
    /// Whether the allowance is shared across kinds or tracked per kind.
    pub scope: QuotaScope,
    /// Replay window for ad tokens. A token presented twice within this
    /// window grants only once.
    pub ad_token_ttl: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: 20,
            scope: QuotaScope::Global,
            ad_token_ttl: Duration::from_secs(600),
        }
    }
}

impl QuotaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the free daily limit.
    pub fn daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = limit;
        self
    }

    /// Track an independent allowance per kind.
    pub fn per_kind(mut self) -> Self {
        self.scope = QuotaScope::PerKind;
        self
    }

    /// Set the ad-token replay window.
    pub fn ad_token_ttl(mut self, ttl: Duration) -> Self {
        self.ad_token_ttl = ttl;
        self
    }
}

/// Outcome of a successful consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Unlimited tier, nothing was counted.
    Unlimited,
    /// Metered consume; `used` includes this request.
    Metered { used: u32, allowance: u32 },
}

/// Result of an ad-credit grant, shaped for the response envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdCreditOutcome {
    /// False when the token was a replay or the tier needs no credits.
    pub granted: bool,
    /// Transformations left today, absent for unlimited tiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LedgerKey {
    requester: String,
    /// `None` under global scope.
    kind: Option<TransformationKind>,
}

/// One requester's counters for one UTC day. Extra credits from ads
/// expire with the day they were granted in.
#[derive(Debug, Clone, Copy)]
struct DayLedger {
    day: NaiveDate,
    used: u32,
    extra: u32,
}

impl DayLedger {
    fn new(day: NaiveDate) -> Self {
        Self {
            day,
            used: 0,
            extra: 0,
        }
    }

    fn roll(&mut self, today: NaiveDate) {
        if self.day != today {
            *self = DayLedger::new(today);
        }
    }
}

/// Daily quota gate.
pub struct QuotaGate {
    config: QuotaConfig,
    ledgers: DashMap<LedgerKey, DayLedger>,
    ad_tokens: moka::sync::Cache<String, ()>,
}

impl QuotaGate {
    pub fn new(config: QuotaConfig) -> Self {
        let ad_tokens = moka::sync::Cache::builder()
            .max_capacity(10_000)
            .time_to_live(config.ad_token_ttl)
            .build();
        Self {
            config,
            ledgers: DashMap::new(),
            ad_tokens,
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Check the requester's allowance and consume one unit of it.
    pub fn try_consume(
        &self,
        requester: &Requester,
        kind: TransformationKind,
    ) -> Result<QuotaDecision> {
        self.try_consume_at(requester, kind, Utc::now().date_naive())
    }

    /// Grant one extra transformation for a watched ad.
    ///
    /// Idempotent per token within the configured replay window: the
    /// first presentation grants, every replay reports `granted: false`
    /// with the unchanged balance.
    pub fn grant_ad_credit(
        &self,
        requester: &Requester,
        kind: Option<TransformationKind>,
        ad_token: &str,
    ) -> Result<AdCreditOutcome> {
        self.grant_ad_credit_at(requester, kind, ad_token, Utc::now().date_naive())
    }

    /// Transformations left today, or `None` for unlimited tiers.
    pub fn remaining_today(
        &self,
        requester: &Requester,
        kind: TransformationKind,
    ) -> Option<u32> {
        if requester.tier == Tier::Unlimited {
            return None;
        }
        let today = Utc::now().date_naive();
        let key = self.key_for(requester, kind);
        let allowance = match self.ledgers.get(&key) {
            Some(ledger) if ledger.day == today => {
                (self.config.daily_limit + ledger.extra).saturating_sub(ledger.used)
            }
            _ => self.config.daily_limit,
        };
        Some(allowance)
    }

    fn try_consume_at(
        &self,
        requester: &Requester,
        kind: TransformationKind,
        today: NaiveDate,
    ) -> Result<QuotaDecision> {
        if requester.tier == Tier::Unlimited {
            return Ok(QuotaDecision::Unlimited);
        }

        let key = self.key_for(requester, kind);
        let mut entry = self
            .ledgers
            .entry(key)
            .or_insert_with(|| DayLedger::new(today));
        let ledger = entry.value_mut();
        ledger.roll(today);

        let allowance = self.config.daily_limit + ledger.extra;
        if ledger.used >= allowance {
            drop(entry);
            metrics::counter!(telemetry::QUOTA_DENIALS_TOTAL,
                "kind" => kind.as_str(),
                "scope" => self.config.scope.as_str(),
            )
            .increment(1);
            debug!(requester = %requester.id, kind = %kind, allowance, "quota exhausted");
            return Err(MorphoError::QuotaExceeded { limit: allowance });
        }

        ledger.used += 1;
        Ok(QuotaDecision::Metered {
            used: ledger.used,
            allowance,
        })
    }

    fn grant_ad_credit_at(
        &self,
        requester: &Requester,
        kind: Option<TransformationKind>,
        ad_token: &str,
        today: NaiveDate,
    ) -> Result<AdCreditOutcome> {
        if ad_token.trim().is_empty() {
            return Err(MorphoError::InvalidInput("ad token must not be empty".into()));
        }
        if requester.tier == Tier::Unlimited {
            return Ok(AdCreditOutcome {
                granted: false,
                remaining: None,
            });
        }

        let key = match (self.config.scope, kind) {
            (QuotaScope::Global, _) => LedgerKey {
                requester: requester.id.clone(),
                kind: None,
            },
            (QuotaScope::PerKind, Some(kind)) => LedgerKey {
                requester: requester.id.clone(),
                kind: Some(kind),
            },
            (QuotaScope::PerKind, None) => {
                return Err(MorphoError::InvalidInput(
                    "per-kind quota needs a kind to credit".into(),
                ));
            }
        };

        // get_with runs the closure for exactly one caller per token;
        // replays (including concurrent ones) see `fresh == false`.
        let mut fresh = false;
        self.ad_tokens.get_with(ad_token.to_string(), || {
            fresh = true;
        });

        let mut entry = self
            .ledgers
            .entry(key)
            .or_insert_with(|| DayLedger::new(today));
        let ledger = entry.value_mut();
        ledger.roll(today);

        if fresh {
            ledger.extra += 1;
            metrics::counter!(telemetry::AD_CREDITS_GRANTED_TOTAL,
                "scope" => self.config.scope.as_str(),
            )
            .increment(1);
            info!(requester = %requester.id, "ad credit granted");
        }

        let remaining = (self.config.daily_limit + ledger.extra).saturating_sub(ledger.used);
        Ok(AdCreditOutcome {
            granted: fresh,
            remaining: Some(remaining),
        })
    }

    fn key_for(&self, requester: &Requester, kind: TransformationKind) -> LedgerKey {
        LedgerKey {
            requester: requester.id.clone(),
            kind: match self.config.scope {
                QuotaScope::Global => None,
                QuotaScope::PerKind => Some(kind),
            },
        }
    }
}

impl std::fmt::Debug for QuotaGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaGate")
            .field("config", &self.config)
            .field("ledgers", &self.ledgers.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
