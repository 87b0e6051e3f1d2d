//! Download relay for vendor-hosted results.
//!
//! Client devices never talk to vendor CDNs directly; they hand the
//! result URL back to the gateway, which fetches and streams it
//! through. That indirection is an obvious request-forgery vector, so
//! the relay is closed by default: a URL must match the configured
//! origin allow-list before any outbound connection is opened. A denied
//! URL produces zero network traffic.
//!
//! Bodies are streamed, never buffered whole. The byte cap is enforced
//! twice: against the Content-Length header before the body is read,
//! and against the actual byte count while it streams (upstreams lie).

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::telemetry;
use crate::{MorphoError, Result};

/// Relayed bytes as they arrive from the vendor CDN.
pub type MediaStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Origins the vendors in the default chains deliver results from.
pub const VENDOR_ORIGINS: &[&str] = &[
    "https://replicate.delivery/",
    "https://img.theapi.app/",
    "https://tempfile.redpandaai.co/",
];

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// URL prefixes the relay may fetch from.
    pub allowed_origins: Vec<String>,
    /// Hard cap on relayed body size.
    pub max_bytes: u64,
    /// Deadline for reaching the upstream and receiving headers. The
    /// body transfer itself is bounded by the byte cap, not by time.
    pub fetch_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            allowed_origins: VENDOR_ORIGINS.iter().map(|s| s.to_string()).collect(),
            max_bytes: DEFAULT_MAX_BYTES,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the origin allow-list.
    pub fn allowed_origins(
        mut self,
        origins: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Set the body size cap.
    pub fn max_bytes(mut self, max: u64) -> Self {
        self.max_bytes = max;
        self
    }

    /// Set the header-phase deadline.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Normalized origin allow-list.
///
/// Every stored prefix ends with `/`, which pins the host boundary:
/// `https://cdn.example.com/` cannot be satisfied by
/// `https://cdn.example.com.evil.test/` or by userinfo tricks like
/// `https://cdn.example.com@evil.test/`.
#[derive(Debug, Clone)]
pub struct AllowedOrigins {
    prefixes: Vec<String>,
}

impl AllowedOrigins {
    pub fn new(origins: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let prefixes = origins
            .into_iter()
            .map(|o| {
                let mut p = o.into().trim().to_string();
                if !p.ends_with('/') {
                    p.push('/');
                }
                p
            })
            .filter(|p| p.starts_with("http://") || p.starts_with("https://"))
            .collect();
        Self { prefixes }
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Whether a URL falls under one of the allowed origins.
    pub fn permits(&self, url: &str) -> bool {
        self.prefixes.iter().any(|p| {
            url.starts_with(p.as_str()) || p.strip_suffix('/').is_some_and(|bare| bare == url)
        })
    }
}

/// A relayed response: upstream metadata plus the capped byte stream.
pub struct RelayedMedia {
    pub content_type: String,
    /// Upstream's declared length, when it sent one.
    pub content_length: Option<u64>,
    pub stream: MediaStream,
}

impl std::fmt::Debug for RelayedMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayedMedia")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// Streaming fetch proxy for allow-listed vendor origins.
pub struct DownloadRelay {
    origins: AllowedOrigins,
    http: Client,
    max_bytes: u64,
    fetch_timeout: Duration,
}

impl DownloadRelay {
    pub fn new(config: RelayConfig) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            origins: AllowedOrigins::new(config.allowed_origins),
            http,
            max_bytes: config.max_bytes,
            fetch_timeout: config.fetch_timeout,
        }
    }

    pub fn origins(&self) -> &AllowedOrigins {
        &self.origins
    }

    /// Fetch an allow-listed URL and return its body as a capped stream.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<RelayedMedia> {
        if !self.origins.permits(url) {
            Self::record_relay("denied");
            warn!(url, "relay denied: origin not allow-listed");
            return Err(MorphoError::OriginNotAllowed(url.to_string()));
        }

        let response =
            match tokio::time::timeout(self.fetch_timeout, self.http.get(url).send()).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    Self::record_relay("error");
                    return Err(MorphoError::UpstreamUnavailable(e.to_string()));
                }
                Err(_) => {
                    Self::record_relay("error");
                    return Err(MorphoError::UpstreamTimeout {
                        timeout: self.fetch_timeout,
                    });
                }
            };

        let status = response.status();
        if !status.is_success() {
            Self::record_relay("error");
            return Err(MorphoError::UpstreamNon2xx {
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        if let Some(len) = content_length
            && len > self.max_bytes
        {
            Self::record_relay("error");
            return Err(MorphoError::PayloadTooLarge {
                limit: self.max_bytes,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        Self::record_relay("ok");
        debug!(url, content_type, ?content_length, "relaying upstream body");

        let cap = self.max_bytes;
        let stream = response.bytes_stream().scan(
            (0u64, false),
            move |(seen, tripped), item| {
                if *tripped {
                    return futures_util::future::ready(None);
                }
                let out = match item {
                    Ok(chunk) => {
                        *seen += chunk.len() as u64;
                        if *seen > cap {
                            *tripped = true;
                            Err(MorphoError::PayloadTooLarge { limit: cap })
                        } else {
                            metrics::counter!(telemetry::RELAY_BYTES_TOTAL)
                                .increment(chunk.len() as u64);
                            Ok(chunk)
                        }
                    }
                    Err(e) => {
                        *tripped = true;
                        Err(MorphoError::UpstreamUnavailable(e.to_string()))
                    }
                };
                futures_util::future::ready(Some(out))
            },
        );

        Ok(RelayedMedia {
            content_type,
            content_length,
            stream: Box::pin(stream),
        })
    }

    fn record_relay(status: &'static str) {
        metrics::counter!(telemetry::RELAY_REQUESTS_TOTAL, "status" => status).increment(1);
    }
}

impl std::fmt::Debug for DownloadRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRelay")
            .field("origins", &self.origins)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
