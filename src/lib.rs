//! Morpho - provider orchestration gateway for AI photo and video effects
//!
//! This crate fronts third-party transformation vendors behind a single
//! [`Morpho`] gateway. Each transformation kind (face swap, cartoon,
//! upscale, ...) walks an ordered fallback chain of providers until one
//! produces a result, daily quotas meter free usage with ad-credit
//! top-ups, finished results replay from a cache keyed by request id,
//! and an allow-listed relay streams vendor media so vendor URLs never
//! reach end users.
//!
//! # Transform Example
//!
//! ```rust,no_run
//! use morpho::{
//!     Morpho, Requester, TransformParams, TransformationKind, TransformationRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> morpho::Result<()> {
//!     let gateway = Morpho::builder()
//!         .replicate("r8_your_token")
//!         .piapi("pk-your-key")
//!         .build()?;
//!
//!     let request = TransformationRequest::new(
//!         TransformationKind::Cartoon,
//!         Requester::metered("user-42"),
//!         "https://cdn.example.com/selfie.jpg",
//!         None,
//!         TransformParams::default(),
//!         Some("req-0193a".into()),
//!     )?;
//!
//!     let outcome = gateway.transform(request).await?;
//!     if let Some(url) = outcome.url {
//!         println!("result at {url}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Relay Example
//!
//! ```rust,no_run
//! use futures_util::StreamExt;
//! use morpho::Morpho;
//!
//! #[tokio::main]
//! async fn main() -> morpho::Result<()> {
//!     let gateway = Morpho::builder().replicate("r8_your_token").build()?;
//!
//!     let mut media = gateway
//!         .relay("https://replicate.delivery/pbxt/abc123/out.jpg")
//!         .await?;
//!     while let Some(chunk) = media.stream.next().await {
//!         let bytes = chunk?;
//!         // write bytes to the client
//!         let _ = bytes;
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod quota;
pub mod relay;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{MorphoError, Result};
pub use gateway::{Morpho, MorphoBuilder};
pub use version::{PKG_VERSION, version_string};

// Re-export configuration types
pub use cache::CacheConfig;
pub use providers::{ChainPlan, RetryConfig, TransformProvider};
pub use quota::{AdCreditOutcome, QuotaConfig, QuotaScope};
pub use relay::{RelayConfig, RelayedMedia};

// Re-export all types
pub use types::{
    AttemptOutcome, MediaClass, MediaInput, ProviderAttempt, Requester, ResultLocation, Tier,
    TransformParams, TransformationKind, TransformationOutcome, TransformationRequest,
};
