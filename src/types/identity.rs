//! Requester identity and subscription tier.
//!
//! Tier resolution happens upstream (the identity collaborator verifies
//! the auth token and stamps the tier); the gateway only consumes the
//! result.

use serde::{Deserialize, Serialize};

/// Subscription tier as resolved by the external identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Paying subscriber; never metered.
    Unlimited,
    /// Free user subject to the daily quota and ad credits.
    Metered,
}

/// The caller on whose behalf a transformation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: String,
    pub tier: Tier,
}

impl Requester {
    pub fn metered(id: impl Into<String>) -> Self {
        Requester {
            id: id.into(),
            tier: Tier::Metered,
        }
    }

    pub fn unlimited(id: impl Into<String>) -> Self {
        Requester {
            id: id.into(),
            tier: Tier::Unlimited,
        }
    }
}
