//! Conversions between raw attribute values and typed values.

use chrono::{DateTime, NaiveDateTime, Utc};

use dirkit_core::{Error, ObjectGuid, Result};

use crate::entry::AttributeValue;

/// 100-ns intervals between 1601-01-01 and 1970-01-01.
pub const FILETIME_UNIX_OFFSET: i64 = 116_444_736_000_000_000;
/// 100-ns intervals per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// First value as text (lossy for binary values).
#[must_use]
pub fn decode_string(values: &[AttributeValue]) -> Option<String> {
    values.first().map(value_to_string)
}

/// All values as text (lossy for binary values).
#[must_use]
pub fn decode_strings(values: &[AttributeValue]) -> Vec<String> {
    values.iter().map(value_to_string).collect()
}

/// First value as raw octets.
#[must_use]
pub fn decode_bytes(values: &[AttributeValue]) -> Option<Vec<u8>> {
    values.first().map(|value| value.as_bytes().to_vec())
}

/// All values as raw octets.
#[must_use]
pub fn decode_all_bytes(values: &[AttributeValue]) -> Vec<Vec<u8>> {
    values.iter().map(|value| value.as_bytes().to_vec()).collect()
}

/// Decimal integer value such as `userAccountControl` or `groupType`.
#[must_use]
pub fn decode_integer(value: &AttributeValue) -> Option<i64> {
    value.as_text().and_then(|text| text.trim().parse().ok())
}

/// Decodes an `objectGUID` value.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the value is not 16 octets.
pub fn decode_guid(value: &AttributeValue) -> Result<ObjectGuid> {
    ObjectGuid::from_directory_bytes(value.as_bytes())
}

/// Converts 100-ns ticks since 1601-01-01 UTC into a timestamp.
///
/// `0` and `i64::MAX` are the directory's "never" markers and decode to `None`.
#[must_use]
pub fn filetime_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks <= 0 || ticks == i64::MAX {
        return None;
    }
    let unix_ticks = ticks - FILETIME_UNIX_OFFSET;
    let seconds = unix_ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = u32::try_from(unix_ticks.rem_euclid(TICKS_PER_SECOND) * 100).ok()?;
    DateTime::from_timestamp(seconds, nanos)
}

/// Converts a timestamp into 100-ns ticks since 1601-01-01 UTC.
#[must_use]
pub fn datetime_to_filetime(value: DateTime<Utc>) -> i64 {
    value
        .timestamp()
        .saturating_mul(TICKS_PER_SECOND)
        .saturating_add(i64::from(value.timestamp_subsec_nanos() / 100))
        .saturating_add(FILETIME_UNIX_OFFSET)
}

/// Decodes generalized time (`20240131094500.0Z`) as used by `whenCreated`.
#[must_use]
pub fn decode_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim().trim_end_matches('Z');
    let whole = trimmed.split(['.', ',']).next()?;
    NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn value_to_string(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Text(text) => text.clone(),
        AttributeValue::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Returns an error naming the attribute when a required value failed to decode.
pub(crate) fn malformed(attribute: &str, value: &AttributeValue) -> Error {
    Error::InvalidInput(format!(
        "attribute `{attribute}` holds undecodable value {:?}",
        value_to_string(value)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filetime_epoch_boundaries() {
        assert_eq!(
            filetime_to_datetime(FILETIME_UNIX_OFFSET),
            Some(Utc.timestamp_opt(0, 0).unwrap())
        );
        assert_eq!(filetime_to_datetime(0), None);
        assert_eq!(filetime_to_datetime(i64::MAX), None);
    }

    #[test]
    fn filetime_known_value() {
        // 2021-01-01T00:00:00Z
        let decoded = filetime_to_datetime(132_539_328_000_000_000).unwrap();
        assert_eq!(decoded, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(datetime_to_filetime(decoded), 132_539_328_000_000_000);
    }

    #[test]
    fn filetime_keeps_sub_second_ticks() {
        let decoded = filetime_to_datetime(FILETIME_UNIX_OFFSET + 15).unwrap();
        assert_eq!(decoded.timestamp_subsec_nanos(), 1_500);
    }

    #[test]
    fn generalized_time() {
        let decoded = decode_generalized_time("20240131094500.0Z").unwrap();
        assert_eq!(
            decoded,
            Utc.with_ymd_and_hms(2024, 1, 31, 9, 45, 0).unwrap()
        );
        assert!(decode_generalized_time("garbage").is_none());
    }

    #[test]
    fn strings_from_mixed_values() {
        let values = vec![
            AttributeValue::from("plain"),
            AttributeValue::Binary(b"bytes".to_vec()),
        ];
        assert_eq!(decode_strings(&values), vec!["plain", "bytes"]);
        assert_eq!(decode_string(&values).as_deref(), Some("plain"));
        assert_eq!(decode_all_bytes(&values)[1], b"bytes".to_vec());
        assert_eq!(decode_bytes(&[]), None);
    }

    #[test]
    fn integers() {
        assert_eq!(decode_integer(&AttributeValue::from("512")), Some(512));
        assert_eq!(decode_integer(&AttributeValue::from("-2147483646")), Some(-2_147_483_646));
        assert_eq!(decode_integer(&AttributeValue::from("x")), None);
    }
}
