//! Timestamps as they appear in stored documents.
//!
//! Documents carry ISO-8601 strings with millisecond precision
//! (`2024-03-01T10:00:00.000Z`). Some writers store epoch milliseconds
//! instead, so parsing accepts both.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

pub type Timestamp = DateTime<Utc>;

/// Source of "now" for every mutation, injectable so ordering can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

#[must_use]
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a timestamp from a JSON value, returning `None` for anything that
/// is not an RFC 3339 string or an epoch-milliseconds number.
#[must_use]
pub fn parse_timestamp_value(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None
    }
}

/// Serde adapter for optional timestamps that never fails on bad input.
pub mod lenient {
    use super::{Timestamp, format_timestamp, parse_timestamp_value};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer
    {
        match value {
            Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
            None => serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
    where
        D: Deserializer<'de>
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        let parsed = raw.as_ref().and_then(parse_timestamp_value);
        if parsed.is_none() && raw.as_ref().is_some_and(|v| !v.is_null()) {
            tracing::debug!("Ignoring unparseable timestamp: {:?}", raw);
        }
        Ok(parsed)
    }
}

/// Serde adapter for required timestamps in locally written documents.
pub mod required {
    use super::{Timestamp, format_timestamp, parse_timestamp_value};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use serde_json::Value;

    pub fn serialize<S>(value: &Timestamp, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer
    {
        serializer.serialize_str(&format_timestamp(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
    where
        D: Deserializer<'de>
    {
        let raw = Value::deserialize(deserializer)?;
        parse_timestamp_value(&raw).ok_or_else(|| D::Error::custom("invalid timestamp"))
    }
}

/// Lenient version counter: numbers (including whole floats) and numeric
/// strings are accepted, anything else reads as `0` and is backfilled later.
pub mod version {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0
        })
    }
}
