//! Key encoding for counter storage
//!
//! Encodes a counter tuple into an ordered key so that every user of one
//! hour + kind + channel sits in a contiguous key range.
//!
//! Key format: `<hour>/<kind>/<channel_id>/<user_id>`
//! Value format: decimal string of a non-negative i64
//!
//! Examples:
//! - `2018-03-15T10/messages/C024BE91L/U0G9QF9C6` -> `12`
//! - `2018-03-15T10/word-count/C024BE91L/U0G9QF9C6` -> `431`

use super::types::{CounterKind, DataPoint};
use crate::error::{Result, StatsError};

/// Encodes and decodes counter keys and values
pub struct CounterKeyEncoder;

impl CounterKeyEncoder {
    /// Component separator; never present in hours, kinds or chat IDs
    pub const SEPARATOR: char = '/';

    /// Encode a data point's tuple into its storage key
    pub fn encode(dp: &DataPoint) -> Vec<u8> {
        format!(
            "{}/{}/{}/{}",
            dp.hour,
            dp.kind.as_str(),
            dp.channel_id,
            dp.user_id
        )
        .into_bytes()
    }

    /// Encode a counter value payload
    pub fn encode_value(value: i64) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    /// Prefix shared by every user of one hour + kind + channel
    ///
    /// Format: `<hour>/<kind>/<channel_id>/`. The trailing separator keeps
    /// channel `C1` from matching keys of channel `C10`.
    pub fn prefix_for(hour: &str, kind: CounterKind, channel_id: &str) -> Vec<u8> {
        format!("{}/{}/{}/", hour, kind.as_str(), channel_id).into_bytes()
    }

    /// Decode a stored key/value pair back into a data point
    pub fn decode(key: &[u8], value: &[u8]) -> Result<DataPoint> {
        let key_text = std::str::from_utf8(key)
            .map_err(|_| StatsError::MalformedKey(String::from_utf8_lossy(key).into_owned()))?;

        let parts: Vec<&str> = key_text.split(Self::SEPARATOR).collect();
        if parts.len() != 4 {
            return Err(StatsError::MalformedKey(key_text.to_string()));
        }
        let kind: CounterKind = parts[1]
            .parse()
            .map_err(|_| StatsError::MalformedKey(key_text.to_string()))?;

        Ok(DataPoint::new(
            parts[0],
            kind,
            parts[2],
            parts[3],
            Self::decode_value(key, value)?,
        ))
    }

    /// Parse a value payload as a non-negative base-10 integer
    pub fn decode_value(key: &[u8], value: &[u8]) -> Result<i64> {
        let malformed = || StatsError::MalformedValue {
            key: String::from_utf8_lossy(key).into_owned(),
            value: String::from_utf8_lossy(value).into_owned(),
        };

        let parsed: i64 = std::str::from_utf8(value)
            .map_err(|_| malformed())?
            .parse()
            .map_err(|_| malformed())?;
        if parsed < 0 {
            return Err(malformed());
        }
        Ok(parsed)
    }

    /// Check the tuple can be encoded without ambiguity
    pub fn validate(dp: &DataPoint) -> Result<()> {
        for component in [&dp.hour, &dp.channel_id, &dp.user_id] {
            if component.is_empty() || component.contains(Self::SEPARATOR) {
                return Err(StatsError::MalformedKey(
                    String::from_utf8_lossy(&Self::encode(dp)).into_owned(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(value: i64) -> DataPoint {
        DataPoint::new("2018-03-15T10", CounterKind::WordCount, "C024BE91L", "U0G9QF9C6", value)
    }

    #[test]
    fn test_encode_key() {
        let key = CounterKeyEncoder::encode(&point(5));
        assert_eq!(key, b"2018-03-15T10/word-count/C024BE91L/U0G9QF9C6".to_vec());
        assert_eq!(CounterKeyEncoder::encode_value(431), b"431".to_vec());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for value in [0, 1, 431, i64::MAX] {
            let original = point(value);
            let decoded = CounterKeyEncoder::decode(
                &CounterKeyEncoder::encode(&original),
                &CounterKeyEncoder::encode_value(original.value),
            )
            .unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_decode_wrong_component_count() {
        for key in ["2018-03-15T10/messages/C1", "a/messages/b/c/d", "", "plain"] {
            let err = CounterKeyEncoder::decode(key.as_bytes(), b"1").unwrap_err();
            assert_eq!(err, StatsError::MalformedKey(key.to_string()));
        }
    }

    #[test]
    fn test_decode_unknown_kind() {
        let err = CounterKeyEncoder::decode(b"2018-03-15T10/likes/C1/U1", b"1").unwrap_err();
        assert!(matches!(err, StatsError::MalformedKey(_)));
    }

    #[test]
    fn test_decode_bad_value() {
        let values: [&[u8]; 5] = [b"abc", b"", b"-3", b"1.5", b"\xff"];
        for value in values {
            let err = CounterKeyEncoder::decode(b"2018-03-15T10/link/C1/U1", value).unwrap_err();
            assert!(matches!(err, StatsError::MalformedValue { .. }), "{err:?}");
        }
    }

    #[test]
    fn test_prefix_is_key_prefix() {
        let dp = point(1);
        let key = CounterKeyEncoder::encode(&dp);
        let prefix = CounterKeyEncoder::prefix_for(&dp.hour, dp.kind, &dp.channel_id);
        assert!(key.starts_with(&prefix));
        assert_eq!(prefix, b"2018-03-15T10/word-count/C024BE91L/".to_vec());
    }

    #[test]
    fn test_prefix_does_not_match_longer_channel() {
        let prefix = CounterKeyEncoder::prefix_for("2018-03-15T10", CounterKind::Link, "C1");
        let other = DataPoint::new("2018-03-15T10", CounterKind::Link, "C10", "U1", 1);
        assert!(!CounterKeyEncoder::encode(&other).starts_with(&prefix));
    }

    #[test]
    fn test_key_order_follows_tuple_order() {
        let a = DataPoint::new("2018-03-15T09", CounterKind::Messages, "C2", "U9", 1);
        let b = DataPoint::new("2018-03-15T10", CounterKind::Messages, "C1", "U1", 1);
        let c = DataPoint::new("2018-03-15T10", CounterKind::Messages, "C1", "U2", 1);
        assert!(CounterKeyEncoder::encode(&a) < CounterKeyEncoder::encode(&b));
        assert!(CounterKeyEncoder::encode(&b) < CounterKeyEncoder::encode(&c));
    }

    #[test]
    fn test_validate_rejects_separator() {
        let mut dp = point(1);
        assert!(CounterKeyEncoder::validate(&dp).is_ok());
        dp.user_id = "U1/evil".into();
        assert!(matches!(
            CounterKeyEncoder::validate(&dp),
            Err(StatsError::MalformedKey(_))
        ));
        dp.user_id = String::new();
        assert!(CounterKeyEncoder::validate(&dp).is_err());
    }
}
