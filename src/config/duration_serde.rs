//! Human-readable durations in configuration files ("500ms", "3s", "1m30s").

/// `#[serde(with = "duration")]` for `Duration` fields. Accepts whole seconds
/// or a humantime string; always writes a humantime string.
pub mod duration {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = Raw::deserialize(deserializer).map_err(|_: D::Error| {
            <D::Error as de::Error>::custom("expected seconds or a duration such as \"500ms\" or \"3s\"")
        })?;
        match raw {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => humantime::parse_duration(&text)
                .map_err(|e| de::Error::custom(format!("invalid duration '{text}': {e}"))),
        }
    }
}
