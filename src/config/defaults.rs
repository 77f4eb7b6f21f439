/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
use std::time::Duration;

// Relay listener defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";

// Outbound HTTP defaults
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 10;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

// Startup retry defaults
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(5);

// Relay shutdown defaults
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);
pub const DEFAULT_SHUTDOWN_FORCE_TIMEOUT: Duration = Duration::from_secs(5);

// Channel link cache
pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(30);

// Emulated set-top box identity
pub const DEFAULT_MODEL: &str = "MAG254";
pub const DEFAULT_SERIAL_NUMBER: &str = "0000000000000";
pub const DEFAULT_DEVICE_ID_CHAR: char = 'f';
pub const DEFAULT_DEVICE_ID_LEN: usize = 64;
pub const DEFAULT_TIME_ZONE: &str = "UTC";
pub const DEFAULT_WATCHDOG_MINUTES: u32 = 5;
pub const MIN_WATCHDOG_MINUTES: u32 = 2;
pub const DEFAULT_DEVICE_ID_AUTH: bool = true;

// Services
pub const DEFAULT_REWRITE: bool = true;
