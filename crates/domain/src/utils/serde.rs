//! Serde helpers for configuration types

use std::time::Duration;

/// `Duration` stored as a millisecond count.
///
/// Serializes to an integer. Deserializes from an integer number of
/// milliseconds or from a string with a `ms`, `s` or `m` suffix
/// (`"1500"`, `"250ms"`, `"30s"`, `"2m"`), which keeps hand-written TOML
/// files readable.
///
/// ```rust
/// use std::time::Duration;
///
/// use policylink_domain::utils::serde::duration_millis;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Timeouts {
///     #[serde(with = "duration_millis")]
///     connect: Duration,
/// }
///
/// let parsed: Timeouts = serde_json::from_str(r#"{"connect":"30s"}"#).unwrap();
/// assert_eq!(parsed.connect, Duration::from_secs(30));
/// ```
pub mod duration_millis {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        deserializer.deserialize_any(MillisVisitor)
    }

    struct MillisVisitor;

    impl<'de> Visitor<'de> for MillisVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("milliseconds as an integer or a string such as \"250ms\", \"30s\" or \"2m\"")
        }

        fn visit_u64<E: de::Error>(self, millis: u64) -> Result<Duration, E> {
            Ok(Duration::from_millis(millis))
        }

        fn visit_i64<E: de::Error>(self, millis: i64) -> Result<Duration, E> {
            u64::try_from(millis)
                .map(Duration::from_millis)
                .map_err(|_| E::invalid_value(de::Unexpected::Signed(millis), &self))
        }

        fn visit_str<E: de::Error>(self, text: &str) -> Result<Duration, E> {
            super::parse_duration(text)
                .ok_or_else(|| E::invalid_value(de::Unexpected::Str(text), &self))
        }
    }
}

/// Parse `"1500"`, `"250ms"`, `"30s"` or `"2m"`. Bare numbers are milliseconds.
pub(crate) fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let digits_end = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
    let (digits, unit) = text.split_at(digits_end);
    let amount: u64 = digits.parse().ok()?;

    match unit.trim() {
        "" | "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        _ => None,
    }
}
