//! Transformation providers and the fallback machinery.
//!
//! Each vendor client implements [`TransformProvider`]; the catalog
//! collects the configured ones and assembles a [`FallbackChain`] per
//! transformation kind.

pub mod catalog;
pub mod chain;
pub mod nano_banana;
pub mod piapi;
pub mod replicate;
pub mod retry;
pub mod traits;

pub use catalog::{ChainPlan, ProviderCatalog};
pub use chain::{ChainRun, ChainSuccess, FallbackChain};
pub use nano_banana::NanoBananaClient;
pub use piapi::PiApiClient;
pub use replicate::ReplicateClient;
pub use retry::{RetryConfig, RetryingTransformProvider};
pub use traits::TransformProvider;
