//! Provider registration and chain assembly.
//!
//! The [`ProviderCatalog`] collects the configured providers (wrapping
//! them in retry decorators when a [`RetryConfig`] is set) and builds
//! one [`FallbackChain`] per enabled kind from a [`ChainPlan`].
//!
//! Registration is key-gated upstream: a provider whose credential is
//! absent is simply never registered. Default chain orders therefore
//! skip unregistered names silently, while an explicit per-kind order
//! in the plan must resolve exactly or assembly fails, so an operator
//! typo surfaces at startup instead of as a dead chain in production.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::types::TransformationKind;
use crate::{MorphoError, Result};

use super::chain::FallbackChain;
use super::retry::{RetryConfig, RetryingTransformProvider};
use super::traits::TransformProvider;

/// Built-in provider order per kind. Names not registered at runtime
/// are skipped; `supports()` filters the rest.
pub(crate) fn default_chain(kind: TransformationKind) -> &'static [&'static str] {
    use TransformationKind::*;
    match kind {
        FaceSwapImage => &["nano-banana", "piapi", "replicate"],
        FaceSwapVideo => &["piapi"],
        HdUpscale => &["replicate", "piapi"],
        RestoreOldPhoto => &["replicate", "nano-banana"],
        Cartoon | Memoji | AnimalToon | MuscleEnhance | ArtStyle => {
            &["nano-banana", "replicate"]
        }
    }
}

/// Operator-facing chain layout: explicit per-kind provider orders and
/// kinds switched off entirely. Deserializes from the config file:
///
/// ```toml
/// [chains]
/// disabled = ["face-swap-video"]
///
/// [chains.orders]
/// face-swap-image = ["piapi", "replicate"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainPlan {
    /// Kind to explicit provider order. Unlisted kinds use the default.
    #[serde(default)]
    pub orders: HashMap<TransformationKind, Vec<String>>,
    /// Kinds that must not get a chain at all.
    #[serde(default)]
    pub disabled: Vec<TransformationKind>,
}

impl ChainPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an explicit provider order for a kind.
    pub fn order(
        mut self,
        kind: TransformationKind,
        providers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.orders
            .insert(kind, providers.into_iter().map(Into::into).collect());
        self
    }

    /// Switch a kind off entirely.
    pub fn disable(mut self, kind: TransformationKind) -> Self {
        self.disabled.push(kind);
        self
    }

    pub fn is_disabled(&self, kind: TransformationKind) -> bool {
        self.disabled.contains(&kind)
    }
}

/// Registered providers, in registration order.
#[derive(Default)]
pub struct ProviderCatalog {
    providers: Vec<Arc<dyn TransformProvider>>,
    retry_config: Option<RetryConfig>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the retry configuration. Providers registered after this
    /// call are wrapped in [`RetryingTransformProvider`].
    pub fn set_retry_config(&mut self, config: RetryConfig) {
        self.retry_config = Some(config);
    }

    /// Register a provider, wrapping it in the retry decorator when a
    /// retry config is set.
    pub fn register(&mut self, provider: Arc<dyn TransformProvider>) {
        let provider = match &self.retry_config {
            Some(config) => {
                Arc::new(RetryingTransformProvider::new(provider, config.clone())) as _
            }
            None => provider,
        };
        self.providers.push(provider);
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Registered provider names, in registration order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    fn find(&self, name: &str) -> Option<Arc<dyn TransformProvider>> {
        self.providers.iter().find(|p| p.name() == name).cloned()
    }

    /// Assemble chains for every enabled kind.
    ///
    /// Fails fast on an empty catalog, an explicit order naming an
    /// unregistered provider, an explicit order naming a provider that
    /// cannot serve the kind, and an explicit order that resolves to
    /// nothing. A default order that resolves to nothing just leaves
    /// the kind without a chain.
    pub fn build_chains(
        &self,
        plan: &ChainPlan,
    ) -> Result<HashMap<TransformationKind, FallbackChain>> {
        if self.providers.is_empty() {
            return Err(MorphoError::NoProvider);
        }

        let mut chains = HashMap::new();
        for kind in TransformationKind::ALL {
            if plan.is_disabled(kind) {
                info!(kind = %kind, "kind disabled by configuration");
                continue;
            }

            let explicit = plan.orders.get(&kind);
            let mut resolved = Vec::new();
            match explicit {
                Some(names) => {
                    for name in names {
                        let provider = self.find(name).ok_or_else(|| {
                            MorphoError::Configuration(format!(
                                "chain for {kind} names unregistered provider {name:?}"
                            ))
                        })?;
                        if !provider.supports(kind) {
                            return Err(MorphoError::Configuration(format!(
                                "provider {name:?} cannot serve {kind}"
                            )));
                        }
                        resolved.push(provider);
                    }
                    if resolved.is_empty() {
                        return Err(MorphoError::Configuration(format!(
                            "chain for {kind} is configured empty; disable the kind instead"
                        )));
                    }
                }
                None => {
                    for name in default_chain(kind) {
                        if let Some(provider) = self.find(name)
                            && provider.supports(kind)
                        {
                            resolved.push(provider);
                        }
                    }
                    if resolved.is_empty() {
                        info!(kind = %kind, "no registered provider serves this kind");
                        continue;
                    }
                }
            }

            let chain = FallbackChain::new(kind, resolved);
            info!(
                kind = %kind,
                providers = ?chain.provider_names(),
                budget_secs = chain.total_budget().as_secs(),
                "chain assembled"
            );
            chains.insert(kind, chain);
        }
        Ok(chains)
    }
}

impl std::fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCatalog")
            .field("providers", &self.provider_names())
            .field("retry", &self.retry_config.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
