//! Serde helpers for configuration durations
//!
//! Configuration files express every duration as integer milliseconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize/deserialize a `Duration` as milliseconds (u64)
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use scrapeshield_domain::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize a Duration as milliseconds
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize milliseconds into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Same as [`duration_millis`] for optional durations (`null` = unset)
pub mod option_duration_millis {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize an optional Duration as milliseconds or `null`
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => {
                serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional milliseconds into an optional Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Timeouts {
        #[serde(with = "duration_millis")]
        attempt: Duration,
        #[serde(default, with = "option_duration_millis")]
        overall: Option<Duration>,
    }

    /// Tests that durations are written as plain milliseconds
    #[test]
    fn test_duration_serializes_as_millis() {
        let data = Timeouts { attempt: Duration::from_millis(1500), overall: None };
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"attempt":1500,"overall":null}"#);
    }

    /// Tests that a missing optional duration falls back to `None`
    #[test]
    fn test_optional_duration_defaults_to_none() {
        let data: Timeouts = serde_json::from_str(r#"{"attempt":250}"#).unwrap();
        assert_eq!(data.attempt, Duration::from_millis(250));
        assert_eq!(data.overall, None);

        let data: Timeouts = serde_json::from_str(r#"{"attempt":0,"overall":90000}"#).unwrap();
        assert_eq!(data.overall, Some(Duration::from_secs(90)));
    }
}
