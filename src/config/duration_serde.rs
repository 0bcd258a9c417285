//! Serde helpers for human-readable durations in configuration.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

/// Serialize as a humantime string, accept either seconds or a humantime string
pub mod duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration_str = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&duration_str)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration as seconds (number) or human-readable string (e.g., '800ms', '5m')")
            }

            fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(seconds))
            }

            fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(seconds)
                    .map(Duration::from_secs)
                    .map_err(|_| de::Error::custom(format!("Negative duration: {seconds}")))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                humantime::parse_duration(value)
                    .map_err(|e| de::Error::custom(format!("Invalid duration '{value}': {e}")))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super::duration")]
        delay: Duration,
    }

    #[test]
    fn parses_humantime_strings() {
        let w: Wrapper = toml::from_str(r#"delay = "800ms""#).unwrap();
        assert_eq!(w.delay, Duration::from_millis(800));
    }

    #[test]
    fn parses_plain_seconds() {
        let w: Wrapper = toml::from_str("delay = 30").unwrap();
        assert_eq!(w.delay, Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(toml::from_str::<Wrapper>(r#"delay = "soon""#).is_err());
    }

    #[test]
    fn serializes_back_to_text() {
        let text = toml::to_string(&Wrapper {
            delay: Duration::from_secs(300),
        })
        .unwrap();
        assert!(text.contains("5m"));
    }
}
