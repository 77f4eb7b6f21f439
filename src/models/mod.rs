use serde::{Deserialize, Serialize};

pub mod status;

pub use status::{ProfilePhase, ProfileRuntimeState};

use crate::config::defaults::*;
use crate::errors::{AppError, AppResult};

/// One upstream account and the relay services exposed for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub portal: PortalSettings,
    #[serde(default)]
    pub hls: HlsServiceConfig,
    #[serde(default)]
    pub proxy: ProxyServiceConfig,
}

/// Portal location and the set-top box identity presented to it.
///
/// Identity fields default to the values of a stock MAG254; only `url` and
/// `mac` normally need to be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSettings {
    pub url: String,
    pub mac: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_serial_number")]
    pub serial_number: String,
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_device_id")]
    pub device_id2: String,
    #[serde(default = "default_device_id")]
    pub signature: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    /// Initial session token; a random one is generated when empty
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_watchdog_minutes")]
    pub watchdog_minutes: u32,
    /// Authenticate with the device ids (get_profile) instead of login/password (do_auth)
    #[serde(default = "default_device_id_auth")]
    pub device_id_auth: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsServiceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 0 binds an ephemeral port
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyServiceConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub port: u16,
    /// Point media URLs in proxied responses at this profile's HLS service
    #[serde(default = "default_rewrite")]
    pub rewrite: bool,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_serial_number() -> String {
    DEFAULT_SERIAL_NUMBER.to_string()
}

fn default_device_id() -> String {
    std::iter::repeat(DEFAULT_DEVICE_ID_CHAR)
        .take(DEFAULT_DEVICE_ID_LEN)
        .collect()
}

fn default_time_zone() -> String {
    DEFAULT_TIME_ZONE.to_string()
}

fn default_watchdog_minutes() -> u32 {
    DEFAULT_WATCHDOG_MINUTES
}

fn default_device_id_auth() -> bool {
    DEFAULT_DEVICE_ID_AUTH
}

fn default_enabled() -> bool {
    true
}

fn default_rewrite() -> bool {
    DEFAULT_REWRITE
}

impl Default for HlsServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 0,
        }
    }
}

impl Default for ProxyServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 0,
            rewrite: DEFAULT_REWRITE,
        }
    }
}

impl PortalSettings {
    /// Settings for `url`/`mac` with every identity field at its default
    pub fn new(url: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mac: mac.into(),
            model: default_model(),
            serial_number: default_serial_number(),
            device_id: default_device_id(),
            device_id2: default_device_id(),
            signature: default_device_id(),
            username: None,
            password: None,
            time_zone: default_time_zone(),
            token: String::new(),
            watchdog_minutes: DEFAULT_WATCHDOG_MINUTES,
            device_id_auth: DEFAULT_DEVICE_ID_AUTH,
        }
    }
}

impl ProfileConfig {
    /// Display name, falling back to the id for unnamed profiles
    pub fn display_name(&self) -> String {
        if self.name.trim().is_empty() {
            format!("profile-{}", self.id)
        } else {
            self.name.clone()
        }
    }

    /// Ports of the enabled services
    pub fn bound_ports(&self) -> Vec<u16> {
        let mut ports = Vec::with_capacity(2);
        if self.hls.enabled {
            ports.push(self.hls.port);
        }
        if self.proxy.enabled {
            ports.push(self.proxy.port);
        }
        ports
    }

    /// Check the service flags of this profile
    pub fn validate_services(&self) -> AppResult<()> {
        if !self.hls.enabled && !self.proxy.enabled {
            return Err(AppError::configuration(
                "either HLS or proxy service must be enabled",
            ));
        }
        if self.proxy.enabled && self.proxy.rewrite && !self.hls.enabled {
            return Err(AppError::configuration(
                "proxy rewrite requires the HLS service to be enabled",
            ));
        }
        if self.hls.enabled
            && self.proxy.enabled
            && self.hls.port != 0
            && self.hls.port == self.proxy.port
        {
            return Err(AppError::configuration(format!(
                "HLS and proxy services cannot share port {}",
                self.hls.port
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(hls: bool, proxy: bool, rewrite: bool) -> ProfileConfig {
        ProfileConfig {
            id: 1,
            name: String::new(),
            portal: PortalSettings::new("http://portal.example", "00:1A:79:12:34:56"),
            hls: HlsServiceConfig {
                enabled: hls,
                port: 8001,
            },
            proxy: ProxyServiceConfig {
                enabled: proxy,
                port: 8002,
                rewrite,
            },
        }
    }

    #[test]
    fn test_service_flags() {
        assert!(profile(true, true, true).validate_services().is_ok());
        assert!(profile(false, true, false).validate_services().is_ok());
        assert!(profile(true, false, true).validate_services().is_ok());
        assert!(matches!(
            profile(false, true, true).validate_services(),
            Err(AppError::Configuration { .. })
        ));
        assert!(matches!(
            profile(false, false, false).validate_services(),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_identity_defaults() {
        let settings: PortalSettings =
            toml::from_str("url = \"http://p.example\"\nmac = \"00:1a:79:00:00:01\"").unwrap();
        assert_eq!(settings.model, "MAG254");
        assert_eq!(settings.device_id.len(), 64);
        assert!(settings.device_id.chars().all(|c| c == 'f'));
        assert_eq!(settings.watchdog_minutes, 5);
        assert!(settings.device_id_auth);
        assert!(settings.token.is_empty());
    }

    #[test]
    fn test_display_name_fallback() {
        let mut p = profile(true, true, true);
        assert_eq!(p.display_name(), "profile-1");
        p.name = "Kitchen".into();
        assert_eq!(p.display_name(), "Kitchen");
    }
}
