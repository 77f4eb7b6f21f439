use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use defaults::*;
use duration_serde::duration;

use crate::errors::{AppError, AppResult};
use crate::models::ProfileConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Address the per-profile HLS and proxy listeners bind to
    #[serde(default = "default_host")]
    pub host: String,
}

/// Pool and timeout settings for the shared outbound clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,
    #[serde(default = "default_connect_timeout", with = "duration")]
    pub connect_timeout: Duration,
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
    #[serde(default = "default_idle_timeout", with = "duration")]
    pub idle_timeout: Duration,
}

/// Backoff for startup-critical portal calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay", with = "duration")]
    pub base_delay: Duration,
    #[serde(default = "default_retry_max_delay", with = "duration")]
    pub max_delay: Duration,
}

/// Drain-then-force shutdown timings for relay listeners
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Time in-flight connections get to finish on their own
    #[serde(default = "default_shutdown_grace", with = "duration")]
    pub grace_period: Duration,
    /// Bound on the forced shutdown that follows the grace window
    #[serde(default = "default_shutdown_force_timeout", with = "duration")]
    pub force_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// How long a resolved playback link is reused before asking the portal again
    #[serde(default = "default_link_ttl", with = "duration")]
    pub link_ttl: Duration,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_max_idle_per_host() -> usize {
    DEFAULT_MAX_IDLE_PER_HOST
}

fn default_idle_timeout() -> Duration {
    DEFAULT_IDLE_TIMEOUT
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_base_delay() -> Duration {
    DEFAULT_RETRY_BASE_DELAY
}

fn default_retry_max_delay() -> Duration {
    DEFAULT_RETRY_MAX_DELAY
}

fn default_shutdown_grace() -> Duration {
    DEFAULT_SHUTDOWN_GRACE
}

fn default_shutdown_force_timeout() -> Duration {
    DEFAULT_SHUTDOWN_FORCE_TIMEOUT
}

fn default_link_ttl() -> Duration {
    DEFAULT_LINK_TTL
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_SHUTDOWN_GRACE,
            force_timeout: DEFAULT_SHUTDOWN_FORCE_TIMEOUT,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            link_ttl: DEFAULT_LINK_TTL,
        }
    }
}

impl Config {
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Process-level checks across profiles. Per-profile settings are
    /// validated when each profile starts so one bad profile cannot keep the
    /// others from running.
    pub fn validate(&self) -> AppResult<()> {
        if self.retry.max_attempts == 0 {
            return Err(AppError::configuration("retry.max_attempts must be at least 1"));
        }

        let mut ids = HashSet::new();
        let mut ports: HashMap<u16, u32> = HashMap::new();
        for profile in &self.profiles {
            if !ids.insert(profile.id) {
                return Err(AppError::configuration(format!(
                    "duplicate profile id {}",
                    profile.id
                )));
            }
            for port in profile.bound_ports() {
                if port == 0 {
                    continue;
                }
                if let Some(owner) = ports.insert(port, profile.id) {
                    return Err(AppError::configuration(format!(
                        "port {} is used by profiles {} and {}",
                        port, owner, profile.id
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.http.request_timeout, Duration::from_secs(30));
        assert_eq!(config.http.max_idle_per_host, 10);
        assert_eq!(config.shutdown.grace_period, Duration::from_secs(3));
        assert_eq!(config.shutdown.force_timeout, Duration::from_secs(5));
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_profiles_section() {
        let config: Config = toml::from_str(
            r#"
            [retry]
            max_attempts = 5
            base_delay = "250ms"

            [[profiles]]
            id = 1
            name = "Living room"
            [profiles.portal]
            url = "http://portal.example/portal.php"
            mac = "00:1A:79:12:34:56"
            [profiles.hls]
            port = 8001
            [profiles.proxy]
            port = 8002
            "#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.profiles.len(), 1);
        assert_eq!(config.profiles[0].hls.port, 8001);
        assert!(config.profiles[0].proxy.rewrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_conflicting_ports_rejected() {
        let config: Config = toml::from_str(
            r#"
            [[profiles]]
            id = 1
            portal = { url = "http://a.example", mac = "00:1A:79:00:00:01" }
            hls = { port = 8001 }
            proxy = { port = 8002 }

            [[profiles]]
            id = 2
            portal = { url = "http://b.example", mac = "00:1A:79:00:00:02" }
            hls = { port = 8002 }
            proxy = { port = 8003 }
            "#,
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_duplicate_profile_ids_rejected() {
        let config: Config = toml::from_str(
            r#"
            [[profiles]]
            id = 3
            portal = { url = "http://a.example", mac = "00:1A:79:00:00:01" }

            [[profiles]]
            id = 3
            portal = { url = "http://b.example", mac = "00:1A:79:00:00:02" }
            "#,
        )
        .unwrap();

        match config.validate() {
            Err(AppError::Configuration { message }) => {
                assert_eq!(message, "duplicate profile id 3")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
