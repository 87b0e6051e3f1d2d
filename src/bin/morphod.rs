//! morphod — Morpho daemon.
//!
//! Serves the transformation gateway over HTTP, letting multiple
//! clients share one set of provider chains, quota counters and the
//! replay cache.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use morpho::Morpho;
use morpho::server;
use morpho::server::config::{Config, Secrets};

/// Morpho daemon — AI transformation gateway service.
#[derive(Parser)]
#[command(name = "morphod")]
#[command(version = morpho::PKG_VERSION)]
#[command(about = "Morpho transformation gateway daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    // Build the gateway from config
    let gateway = build_gateway(&config, &secrets)?;

    info!(
        version = morpho::version_string(),
        kinds = ?gateway.enabled_kinds(),
        "morphod starting"
    );

    server::serve(Arc::new(gateway), &config.server).await?;

    Ok(())
}

/// Build a [`Morpho`] gateway from configuration.
///
/// Vendors register by credential presence: a key in the secrets file
/// or the environment enables the vendor, and the `[chains]` table
/// decides where it actually serves.
fn build_gateway(config: &Config, secrets: &Secrets) -> Result<Morpho, morpho::MorphoError> {
    let mut builder = Morpho::builder();

    if let Some(token) = secrets.api_key("replicate") {
        builder = builder.replicate(token);
    }
    if let Some(key) = secrets.api_key("piapi") {
        builder = builder.piapi(key);
    }

    builder = builder
        .quota(config.quota.clone().into())
        .relay(config.relay.clone().into())
        .result_cache(config.cache.clone().into())
        .retry_config(config.retry.clone().into())
        .chains(config.chains.clone());

    builder.build()
}
