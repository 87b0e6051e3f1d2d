//! Builder for configuring gateway instances.

use std::sync::Arc;

use super::Morpho;
use crate::cache::{CacheConfig, ResultCache};
use crate::providers::{
    ChainPlan, NanoBananaClient, PiApiClient, ProviderCatalog, ReplicateClient, RetryConfig,
    TransformProvider,
};
use crate::quota::{QuotaConfig, QuotaGate};
use crate::relay::{DownloadRelay, RelayConfig};
use crate::{MorphoError, Result};

/// Builder for configuring gateway instances.
///
/// Providers are key-gated: a vendor only joins the chains when its
/// credential is supplied. The Replicate token serves both the
/// nano-banana model and the dedicated legacy models.
///
/// ```rust,no_run
/// # use morpho::Morpho;
/// # fn main() -> morpho::Result<()> {
/// let gateway = Morpho::builder()
///     .replicate("r8_...")
///     .piapi("pk-...")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct MorphoBuilder {
    replicate_token: Option<String>,
    piapi_key: Option<String>,
    extra_providers: Vec<Arc<dyn TransformProvider>>,
    retry: Option<RetryConfig>,
    quota: QuotaConfig,
    relay: RelayConfig,
    cache: CacheConfig,
    plan: ChainPlan,
}

impl MorphoBuilder {
    pub fn new() -> Self {
        Self {
            replicate_token: None,
            piapi_key: None,
            extra_providers: Vec::new(),
            retry: Some(RetryConfig::default()),
            quota: QuotaConfig::default(),
            relay: RelayConfig::default(),
            cache: CacheConfig::default(),
            plan: ChainPlan::default(),
        }
    }

    /// Configure the Replicate token (enables nano-banana and the
    /// dedicated legacy models).
    pub fn replicate(mut self, api_token: impl Into<String>) -> Self {
        self.replicate_token = Some(api_token.into());
        self
    }

    /// Configure the PiAPI key (enables the Qubico toolkits, including
    /// video face swap).
    pub fn piapi(mut self, api_key: impl Into<String>) -> Self {
        self.piapi_key = Some(api_key.into());
        self
    }

    /// Register an additional provider. It only appears in a chain when
    /// an explicit order in the [`ChainPlan`] names it, or when its
    /// name matches a default chain entry.
    pub fn provider(mut self, provider: Arc<dyn TransformProvider>) -> Self {
        self.extra_providers.push(provider);
        self
    }

    /// Tune the per-provider retry behaviour.
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Disable per-provider retries; every vendor gets a single attempt
    /// before the chain moves on.
    pub fn no_retry(mut self) -> Self {
        self.retry = None;
        self
    }

    /// Set the daily quota configuration.
    pub fn quota(mut self, config: QuotaConfig) -> Self {
        self.quota = config;
        self
    }

    /// Set the download relay configuration.
    pub fn relay(mut self, config: RelayConfig) -> Self {
        self.relay = config;
        self
    }

    /// Set the replay cache configuration.
    pub fn result_cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Set the chain layout (explicit orders, disabled kinds).
    pub fn chains(mut self, plan: ChainPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Build the gateway. Fails when no provider is configured or the
    /// chain plan does not resolve against the registered providers.
    pub fn build(self) -> Result<Morpho> {
        if self.replicate_token.is_none()
            && self.piapi_key.is_none()
            && self.extra_providers.is_empty()
        {
            return Err(MorphoError::NoProvider);
        }

        let mut catalog = ProviderCatalog::new();
        if let Some(config) = self.retry {
            catalog.set_retry_config(config);
        }

        if let Some(ref token) = self.replicate_token {
            catalog.register(Arc::new(NanoBananaClient::new(token.clone())));
            catalog.register(Arc::new(ReplicateClient::new(token.clone())));
        }
        if let Some(ref key) = self.piapi_key {
            catalog.register(Arc::new(PiApiClient::new(key.clone())));
        }
        for provider in self.extra_providers {
            catalog.register(provider);
        }

        let chains = catalog.build_chains(&self.plan)?;

        Ok(Morpho::new(
            chains,
            QuotaGate::new(self.quota),
            DownloadRelay::new(self.relay),
            ResultCache::new(&self.cache),
        ))
    }
}

impl Default for MorphoBuilder {
    fn default() -> Self {
        Self::new()
    }
}
