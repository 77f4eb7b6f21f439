//! Process-wide outbound HTTP clients
//!
//! Every profile talks to its portal through the same pooled clients so that
//! many concurrent profiles cannot exhaust sockets. Two clients exist:
//!
//! - `portal`: API calls (handshake, auth, catalog, link resolution, proxy
//!   passthrough, logos). Bounded per-request timeout.
//! - `stream`: media bodies relayed by the HLS server. Connect timeout only,
//!   since live streams stay open indefinitely.

use reqwest::Client;
use tracing::debug;

use crate::config::HttpConfig;
use crate::errors::{AppError, AppResult};

/// Shared outbound clients. Cloning is cheap; clones share the pools.
#[derive(Clone, Debug)]
pub struct HttpClients {
    portal: Client,
    stream: Client,
}

impl HttpClients {
    /// Build both pooled clients from configuration
    pub fn new(config: &HttpConfig) -> AppResult<Self> {
        let portal = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create portal HTTP client: {e}")))?;

        let stream = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to create stream HTTP client: {e}")))?;

        debug!(
            "HTTP clients ready: request_timeout={:?} connect_timeout={:?} idle_per_host={} idle_timeout={:?}",
            config.request_timeout, config.connect_timeout, config.max_idle_per_host, config.idle_timeout
        );

        Ok(Self { portal, stream })
    }

    /// Client for portal API calls
    pub fn portal(&self) -> &Client {
        &self.portal
    }

    /// Client for long-lived media bodies
    pub fn stream(&self) -> &Client {
        &self.stream
    }
}
