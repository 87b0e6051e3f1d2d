//! Configuration loading for morphod.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.morpho/config.toml` (user)
//! 3. `/etc/morpho/config.toml` (system)
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.morpho/secrets.toml` (user, must be 0600)
//! 2. `/etc/morpho/secrets.toml` (system, must be 0600)
//!
//! Vendors register by key presence alone: a key in the secrets file or
//! in the environment enables the vendor, and the `[chains]` table is
//! where deployments switch kinds off or reorder providers.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::providers::{ChainPlan, RetryConfig};
use crate::quota::{QuotaConfig, QuotaScope};
use crate::relay::RelayConfig;
use crate::{MorphoError, Result};

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub quota: QuotaSection,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub chains: ChainPlan,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8460).
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            limits: LimitsConfig::default(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8460".to_string()
}

/// Resource limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes (default: 32 MiB; data-URI
    /// video targets are large).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Request timeout in seconds (default: 300). Must cover the
    /// slowest chain's full budget or transforms get cut off mid-walk.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_timeout(),
        }
    }
}

fn default_max_body_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_timeout() -> u64 {
    300
}

/// Daily quota settings.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaSection {
    /// Free transformations per requester per UTC day (default: 20).
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// "global" or "per-kind" (default: global).
    #[serde(default)]
    pub scope: QuotaScope,
    /// Ad-token replay window in seconds (default: 600).
    #[serde(default = "default_ad_token_ttl")]
    pub ad_token_ttl_secs: u64,
}

impl Default for QuotaSection {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            scope: QuotaScope::default(),
            ad_token_ttl_secs: default_ad_token_ttl(),
        }
    }
}

fn default_daily_limit() -> u32 {
    20
}

fn default_ad_token_ttl() -> u64 {
    600
}

impl From<QuotaSection> for QuotaConfig {
    fn from(section: QuotaSection) -> Self {
        QuotaConfig {
            daily_limit: section.daily_limit,
            scope: section.scope,
            ad_token_ttl: Duration::from_secs(section.ad_token_ttl_secs),
        }
    }
}

/// Download relay settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    /// URL prefixes the relay may fetch from. Defaults to the origins
    /// the built-in vendors deliver results on.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Hard cap on relayed body size in bytes (default: 50 MiB).
    #[serde(default = "default_relay_max_bytes")]
    pub max_bytes: u64,
    /// Upstream header deadline in seconds (default: 30).
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            max_bytes: default_relay_max_bytes(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    crate::relay::VENDOR_ORIGINS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_relay_max_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_fetch_timeout() -> u64 {
    30
}

impl From<RelaySection> for RelayConfig {
    fn from(section: RelaySection) -> Self {
        RelayConfig::new()
            .allowed_origins(section.allowed_origins)
            .max_bytes(section.max_bytes)
            .fetch_timeout(Duration::from_secs(section.fetch_timeout_secs))
    }
}

/// Replay cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Maximum cached outcomes (default: 10,000).
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,
    /// Entry time-to-live in seconds (default: 3600).
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_entries() -> u64 {
    10_000
}

fn default_cache_ttl() -> u64 {
    3600
}

impl From<CacheSection> for CacheConfig {
    fn from(section: CacheSection) -> Self {
        CacheConfig::new()
            .max_entries(section.max_entries)
            .ttl(Duration::from_secs(section.ttl_secs))
    }
}

/// Per-provider retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Attempts per provider, including the first (default: 3; 1
    /// disables retries).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds (default: 500).
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Backoff ceiling in seconds (default: 30).
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    /// Randomize delays (default: true).
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_secs: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30
}

fn default_jitter() -> bool {
    true
}

impl From<RetrySection> for RetryConfig {
    fn from(section: RetrySection) -> Self {
        RetryConfig::new()
            .max_attempts(section.max_attempts)
            .initial_delay(Duration::from_millis(section.initial_delay_ms))
            .max_delay(Duration::from_secs(section.max_delay_secs))
            .jitter(section.jitter)
    }
}

// ChainPlan is re-used from crate::providers::catalog (single source of truth).

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub replicate: Option<ApiKeySecret>,
    #[serde(default)]
    pub piapi: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Provider name → environment variable name mapping.
const PROVIDER_ENV_VARS: &[(&str, &str)] = &[
    ("replicate", "REPLICATE_API_TOKEN"),
    ("piapi", "PIAPI_API_KEY"),
];

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.morpho/config.toml`
    /// 3. `/etc/morpho/config.toml`
    ///
    /// With no config file anywhere, every setting falls back to its
    /// default; keys alone are enough to run.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_config_path(explicit_path)? else {
            return Ok(Config::default());
        };
        let content = fs::read_to_string(&path).map_err(|e| {
            MorphoError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MorphoError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MorphoError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".morpho").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/morpho/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.morpho/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/morpho/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists (providers may use env vars).
    pub fn load() -> Result<Self> {
        // Try user secrets first
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".morpho").join("secrets.toml");
            if user_secrets.exists() {
                Self::check_permissions(&user_secrets)?;
                return Self::load_from_file(&user_secrets);
            }
        }

        // Try system secrets
        let system_secrets = PathBuf::from("/etc/morpho/secrets.toml");
        if system_secrets.exists() {
            Self::check_permissions(&system_secrets)?;
            return Self::load_from_file(&system_secrets);
        }

        // No secrets file — return empty (providers can fall back to env vars)
        Ok(Secrets::default())
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MorphoError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MorphoError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            MorphoError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(MorphoError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        // Permission check not available on non-Unix platforms
        Ok(())
    }

    /// Get API key for a provider, falling back to the corresponding environment variable.
    pub fn api_key(&self, provider: &str) -> Option<String> {
        // Try secrets file first
        let from_file = match provider {
            "replicate" => self.replicate.as_ref(),
            "piapi" => self.piapi.as_ref(),
            _ => None,
        }
        .map(|s| s.api_key.clone());

        // Fall back to env var
        from_file.or_else(|| {
            PROVIDER_ENV_VARS
                .iter()
                .find(|(name, _)| *name == provider)
                .and_then(|(_, env_var)| std::env::var(env_var).ok())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransformationKind;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.address, "127.0.0.1:8460");
        assert_eq!(config.server.limits.max_body_bytes, 32 * 1024 * 1024);
        assert_eq!(config.server.limits.request_timeout_secs, 300);
        assert_eq!(config.quota.daily_limit, 20);
        assert_eq!(config.relay.max_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
            [server]
            address = "0.0.0.0:8460"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.address, "0.0.0.0:8460");
        // Defaults preserved
        assert_eq!(config.quota.daily_limit, 20);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [server]
            address = "127.0.0.1:8460"

            [server.limits]
            max_body_bytes = 1048576
            request_timeout_secs = 600

            [quota]
            daily_limit = 5
            scope = "per-kind"
            ad_token_ttl_secs = 120

            [relay]
            allowed_origins = ["https://cdn.partner.example/"]
            max_bytes = 1000000
            fetch_timeout_secs = 10

            [cache]
            max_entries = 500
            ttl_secs = 60

            [retry]
            max_attempts = 1

            [chains]
            disabled = ["face-swap-video"]

            [chains.orders]
            cartoon = ["replicate", "nano-banana"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.limits.request_timeout_secs, 600);
        assert_eq!(config.quota.daily_limit, 5);
        assert!(matches!(config.quota.scope, QuotaScope::PerKind));
        assert_eq!(
            config.relay.allowed_origins,
            vec!["https://cdn.partner.example/"]
        );
        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(config.retry.max_attempts, 1);
        assert!(config.chains.is_disabled(TransformationKind::FaceSwapVideo));
        assert_eq!(
            config.chains.orders[&TransformationKind::Cartoon],
            vec!["replicate", "nano-banana"]
        );
    }

    #[test]
    fn sections_convert_to_library_configs() {
        let quota: QuotaConfig = QuotaSection {
            daily_limit: 7,
            scope: QuotaScope::PerKind,
            ad_token_ttl_secs: 60,
        }
        .into();
        assert_eq!(quota.daily_limit, 7);
        assert_eq!(quota.ad_token_ttl, Duration::from_secs(60));

        let retry: RetryConfig = RetrySection::default().into();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn parse_secrets() {
        let toml = r#"
            [replicate]
            api_key = "r8_test_token"

            [piapi]
            api_key = "pk-test-key"
        "#;
        let secrets: Secrets = toml::from_str(toml).unwrap();
        assert_eq!(secrets.replicate.as_ref().unwrap().api_key, "r8_test_token");
        assert_eq!(secrets.piapi.as_ref().unwrap().api_key, "pk-test-key");
    }

    #[test]
    fn api_key_from_secrets() {
        let secrets = Secrets {
            replicate: Some(ApiKeySecret {
                api_key: "from-file".to_string(),
            }),
            ..Default::default()
        };
        assert_eq!(secrets.api_key("replicate"), Some("from-file".to_string()));
        // Unknown provider returns None
        assert_eq!(secrets.api_key("nonexistent"), None);
    }

    #[test]
    fn config_not_found_returns_error() {
        let result = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn load_reads_an_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[quota]\ndaily_limit = 3\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.quota.daily_limit, 3);
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_secrets_are_refused() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        fs::write(&path, "[replicate]\napi_key = \"r8_test\"\n").unwrap();

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let err = Secrets::check_permissions(&path).unwrap_err();
        assert!(err.to_string().contains("insecure permissions"));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();
        Secrets::check_permissions(&path).unwrap();
        let secrets = Secrets::load_from_file(&path).unwrap();
        assert_eq!(secrets.api_key("replicate"), Some("r8_test".to_string()));
    }
}
