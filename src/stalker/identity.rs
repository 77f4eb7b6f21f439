//! Validated set-top box identity

use std::sync::LazyLock;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use url::Url;

use crate::config::defaults::MIN_WATCHDOG_MINUTES;
use crate::errors::{AppError, AppResult};
use crate::models::PortalSettings;
use crate::utils::UrlUtils;

static MAC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-F0-9]{2}(:[A-F0-9]{2}){5}$").expect("valid MAC regex"));

static TIME_ZONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(UTC|GMT|[A-Za-z_]+(/[A-Za-z0-9_+\-]+)+)$").expect("valid time zone regex")
});

const TOKEN_ALPHABET: &[u8] = b"ABCDEF0123456789";
const TOKEN_LEN: usize = 32;

/// Identity presented to one portal, produced by [`PortalIdentity::from_settings`]
#[derive(Clone)]
pub struct PortalIdentity {
    /// Canonical `portal.php` endpoint
    pub location: String,
    pub mac: String,
    pub model: String,
    pub serial_number: String,
    pub device_id: String,
    pub device_id2: String,
    pub signature: String,
    pub username: String,
    pub password: String,
    pub time_zone: String,
    /// Token sent with the first handshake
    pub initial_token: String,
    pub watchdog_interval: Duration,
    pub device_id_auth: bool,
}

impl std::fmt::Debug for PortalIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalIdentity")
            .field("location", &self.location)
            .field("mac", &self.mac)
            .field("model", &self.model)
            .field("time_zone", &self.time_zone)
            .field("watchdog_interval", &self.watchdog_interval)
            .field("device_id_auth", &self.device_id_auth)
            .finish_non_exhaustive()
    }
}

impl PortalIdentity {
    pub fn from_settings(settings: &PortalSettings) -> AppResult<Self> {
        let location = UrlUtils::normalize_portal_url(&settings.url);
        if location.is_empty() {
            return Err(AppError::configuration("portal URL is required"));
        }
        let parsed = Url::parse(&location)
            .map_err(|e| AppError::configuration(format!("invalid portal URL: {e}")))?;
        if parsed.host_str().is_none() {
            return Err(AppError::configuration("portal URL has no host"));
        }

        let mac = settings.mac.trim().to_ascii_uppercase();
        if !MAC_PATTERN.is_match(&mac) {
            return Err(AppError::configuration(format!(
                "invalid MAC address '{}', expected the form 00:1A:79:12:34:56",
                settings.mac
            )));
        }

        let model = required("model", &settings.model)?;
        let serial_number = required("serial number", &settings.serial_number)?;
        let device_id = required("device id", &settings.device_id)?;
        let device_id2 = required("device id 2", &settings.device_id2)?;

        let time_zone = settings.time_zone.trim().to_string();
        if !TIME_ZONE_PATTERN.is_match(&time_zone) {
            return Err(AppError::configuration(format!(
                "invalid time zone '{time_zone}', expected UTC or an Area/Location name"
            )));
        }

        let username = settings.username.clone().unwrap_or_default();
        let password = settings.password.clone().unwrap_or_default();
        if !settings.device_id_auth && (username.is_empty() || password.is_empty()) {
            return Err(AppError::configuration(
                "username and password are required when device id authentication is disabled",
            ));
        }

        let initial_token = match settings.token.trim() {
            "" => random_token(),
            token => token.to_string(),
        };

        let minutes = settings.watchdog_minutes.max(MIN_WATCHDOG_MINUTES);

        Ok(Self {
            location,
            mac,
            model,
            serial_number,
            device_id,
            device_id2,
            signature: settings.signature.trim().to_string(),
            username,
            password,
            time_zone,
            initial_token,
            watchdog_interval: Duration::from_secs(u64::from(minutes) * 60),
            device_id_auth: settings.device_id_auth,
        })
    }

    /// `X-User-Agent` header value
    pub fn x_user_agent(&self) -> String {
        format!("Model: {}; Link: Ethernet", self.model)
    }

    /// `Cookie` header value
    pub fn cookie(&self) -> String {
        format!(
            "sn={}; mac={}; stb_lang=en; timezone={}",
            self.serial_number, self.mac, self.time_zone
        )
    }
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::configuration(format!("{field} is required")));
    }
    Ok(value.to_string())
}

/// 32 upper-case hex characters
pub fn random_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}
